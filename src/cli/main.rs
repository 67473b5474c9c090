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

use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Run the email node: worker tasks plus the POP3 server.
    ///
    /// Reads `bote.toml` from the node root and serves until SIGINT or
    /// SIGTERM.
    Serve(ServeSubcommand),
}

#[derive(StructOpt)]
struct ServeSubcommand {
    /// The node data directory, containing `bote.toml` [default: .]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

pub fn main() {
    let command = Command::from_args();
    crate::init_simple_log();

    match command {
        Command::Serve(options) => {
            super::serve::serve(
                options.root.unwrap_or_else(|| PathBuf::from(".")),
            )
        },
    }
}
