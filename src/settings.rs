// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Fixed deployment literals for the supervised server

use std::path::PathBuf;

/// Everything the supervisor knows about the server it manages.
///
/// The server is an external collaborator, its flags are opaque strings
/// passed through unchanged. Defaults are the production literals, tests
/// substitute their own.
#[derive(Clone, Debug)]
pub struct Settings {
    /// substring matched against each command line in the process table
    pub pattern: String,
    /// interpreter that runs the server
    pub program: String,
    /// server entrypoint handed to the interpreter
    pub script: String,
    /// address the server should bind
    pub bind_host: String,
    /// merged stdout and stderr of the server land here, append mode
    pub log_path: PathBuf,
    /// signaling other users' processes and binding the server need root
    pub require_root: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pattern: "python3 idarling_server.py".to_string(),
            program: "python3".to_string(),
            script: "idarling_server.py".to_string(),
            bind_host: "0.0.0.0".to_string(),
            log_path: PathBuf::from("idarling_server.log"),
            require_root: true,
        }
    }
}
