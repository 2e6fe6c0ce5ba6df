// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Access to the OS process table

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysinfo::{ProcessRefreshKind, System, UpdateKind};

use crate::Error;

/// One observed process record, enumerated fresh on every scan and
/// discarded after use.
#[derive(Clone, Debug)]
pub struct ProcessMatch {
    pub pid: u32,
    pub cmdline: String,
}

/// Capability over the OS process table
///
/// Rules:
///   - list is a snapshot, a pid may be gone before it is signaled
///   - signal requests termination, it never verifies the outcome
pub trait ProcessTable {
    fn list(&mut self) -> Vec<ProcessMatch>;

    fn signal(&mut self, pid: u32) -> Result<(), Error>;
}

/// The live process table of the host
pub struct SysProcessTable {
    system: System,
}

impl SysProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysProcessTable {
    /// Snapshot every current process except this one, with its full
    /// command line joined into a single string.
    fn list(&mut self) -> Vec<ProcessMatch> {
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

        let own_pid = sysinfo::get_current_pid().ok();

        self.system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own_pid)
            .map(|(pid, process)| ProcessMatch {
                pid: pid.as_u32(),
                cmdline: process.cmd().join(" "),
            })
            .collect()
    }

    fn signal(&mut self, pid: u32) -> Result<(), Error> {
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
        Ok(())
    }
}
