//-
// Copyright (c) 2026, the Bote developers
//
// This file is part of Bote.
//
// Bote is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Bote is distributed  in the hope  that it  will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Bote. If not, see <http://www.gnu.org/licenses/>.

//! A blocking FIFO used between the transport and the pipeline.
//!
//! One mutex, one condvar. `wake_up` broadcasts so that a shutdown can
//! release every waiter without inventing a poison value; a consumer that
//! was released this way sees `None`. The wake-up stays latched until the
//! next `put`, so late consumers during shutdown also return immediately.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct Queue<T> {
    state: Mutex<State<T>>,
    non_empty: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    woken: bool,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                woken: false,
            }),
            non_empty: Condvar::new(),
        }
    }

    pub fn put(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.woken = false;
        state.items.push_back(item);
        self.non_empty.notify_one();
    }

    pub fn put_many(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }

        let mut state = self.state.lock().unwrap();
        state.woken = false;
        state.items.extend(items);
        self.non_empty.notify_all();
    }

    /// Pop the next item, blocking until one arrives.
    ///
    /// Returns `None` if the wait was broken by `wake_up`.
    pub fn get_next(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.woken {
                return None;
            }
            state = self.non_empty.wait(state).unwrap();
        }
    }

    /// Pop the next item, waiting at most `timeout_ms` milliseconds.
    pub fn get_next_with_timeout(&self, timeout_ms: u64) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.pop_front() {
            return Some(item);
        }
        if state.woken {
            return None;
        }

        let (mut state, _) = self
            .non_empty
            .wait_timeout(state, Duration::from_millis(timeout_ms))
            .unwrap();
        state.items.pop_front()
    }

    /// Return a copy of the next item without consuming it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.lock().unwrap().items.front().cloned()
    }

    /// Release every blocked consumer.
    pub fn wake_up(&self) {
        self.state.lock().unwrap().woken = true;
        self.non_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().items.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Queue::new()
    }
}
