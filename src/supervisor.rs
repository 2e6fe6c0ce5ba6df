// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Stop stale server instances, then maybe start a fresh one

use std::ffi::OsString;
use std::os::unix::io::FromRawFd;
use std::process::Stdio;

use nix::fcntl::OFlag;
use nix::unistd::{dup, pipe2, Uid};
use tokio::process::Command;

use crate::error::ErrorKind;
use crate::settings::Settings;
use crate::table::ProcessTable;
use crate::Error;

/// Supervisor for a single external server process
///
/// Rules:
///   - termination is best-effort, per-pid failures are swallowed
///   - never waits on the child it launches
///   - the child gets its own session and outlives the supervisor
pub struct ProcessSupervisor<T: ProcessTable> {
    table: T,
    settings: Settings,
}

impl<T: ProcessTable> ProcessSupervisor<T> {
    pub fn new(table: T, settings: Settings) -> Self {
        Self { table, settings }
    }

    /// Both steps assume elevated privilege, check it up front rather than
    /// letting the sweep silently do less than asked.
    pub fn check_privilege(&self) -> Result<(), Error> {
        if self.settings.require_root && !Uid::effective().is_root() {
            return Err(Error::from(ErrorKind::NotRoot));
        }

        Ok(())
    }

    /// Request termination of every process whose command line contains
    /// `pattern` as a substring.
    ///
    /// Returns the number of requests issued, not the number that
    /// succeeded. A match that exited between scan and kill, or one this
    /// user may not signal, is skipped and the sweep continues.
    pub fn terminate_matching(&mut self, pattern: &str) -> usize {
        let mut requested = 0;

        for process in self.table.list() {
            if !process.cmdline.contains(pattern) {
                continue;
            }

            requested += 1;
            if let Err(err) = self.table.signal(process.pid) {
                println!("could not signal {}: {}", process.pid, err);
            }
        }

        requested
    }

    /// Launch the server detached, if and only if `args` is empty.
    ///
    /// The argument list is fixed, `args` is never forwarded: supplying any
    /// argument at all only suppresses the relaunch. The server's merged
    /// stdout and stderr feed a detached `tee` that duplicates them to the
    /// terminal (if attached) and the log file; neither pid is captured.
    pub async fn maybe_start(&mut self, args: &[OsString]) -> Result<(), Error> {
        if !args.is_empty() {
            return Ok(());
        }

        // one pipe carries the merged stdout and stderr of the server,
        // close-on-exec so no child keeps a stray write end open
        let (pipe_read, pipe_write) = pipe2(OFlag::O_CLOEXEC)?;

        let mut tee = Command::new("tee");
        tee.arg("-a")
            .arg(&self.settings.log_path)
            .stdin(unsafe { Stdio::from_raw_fd(pipe_read) })
            .stdout(Stdio::inherit())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        // its own session, the tee must outlive us just like the server
        unsafe {
            tee.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let _tee = tee.spawn()?;

        // second write end for stderr, dup'd only after the tee spawn: the
        // dup is not close-on-exec and the tee must not hold a write end,
        // or it would never see EOF
        let stderr_write = dup(pipe_write)?;

        let mut command = Command::new(&self.settings.program);
        command
            .arg(&self.settings.script)
            .arg("-h")
            .arg(&self.settings.bind_host)
            .arg("--no-ssl")
            .arg("--level")
            .arg("DEBUG")
            .stdin(Stdio::null())
            .stdout(unsafe { Stdio::from_raw_fd(pipe_write) })
            .stderr(unsafe { Stdio::from_raw_fd(stderr_write) })
            .kill_on_drop(false);

        // new session, so the child survives our exit and terminal hangup
        unsafe {
            command.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        // dropping the handle leaves the child running; if the spawn fails
        // the write ends close and the tee exits on its own
        let _child = command.spawn()?;

        println!(
            "started {} {}, logging to {}",
            self.settings.program,
            self.settings.script,
            self.settings.log_path.display()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ProcessMatch;

    use tokio::runtime;

    #[derive(Default)]
    struct FakeTable {
        procs: Vec<ProcessMatch>,
        deny: Vec<u32>,
        signaled: Vec<u32>,
    }

    impl FakeTable {
        fn with_procs(procs: &[(u32, &str)]) -> Self {
            Self {
                procs: procs
                    .iter()
                    .map(|(pid, cmdline)| ProcessMatch {
                        pid: *pid,
                        cmdline: cmdline.to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl ProcessTable for FakeTable {
        fn list(&mut self) -> Vec<ProcessMatch> {
            self.procs.clone()
        }

        fn signal(&mut self, pid: u32) -> Result<(), Error> {
            self.signaled.push(pid);
            if self.deny.contains(&pid) {
                return Err(Error::from("operation not permitted"));
            }

            Ok(())
        }
    }

    fn unprivileged_settings() -> Settings {
        Settings {
            require_root: false,
            ..Settings::default()
        }
    }

    #[test]
    fn test_no_match_signals_nothing() {
        let table = FakeTable::with_procs(&[(10, "/sbin/init"), (22, "sshd: root@pts/0")]);
        let mut supervisor = ProcessSupervisor::new(table, unprivileged_settings());

        assert_eq!(supervisor.terminate_matching("python3 idarling_server.py"), 0);
        assert!(supervisor.table.signaled.is_empty());
    }

    #[test]
    fn test_every_match_is_signaled() {
        let table = FakeTable::with_procs(&[
            (100, "python3 idarling_server.py -h 0.0.0.0 --no-ssl --level DEBUG"),
            (101, "/usr/bin/vim idarling_server.py"),
            (102, "sudo python3 idarling_server.py -h 0.0.0.0"),
        ]);
        let mut supervisor = ProcessSupervisor::new(table, unprivileged_settings());

        assert_eq!(supervisor.terminate_matching("python3 idarling_server.py"), 2);
        assert_eq!(supervisor.table.signaled, vec![100, 102]);
    }

    #[test]
    fn test_denied_signal_does_not_stop_the_sweep() {
        let mut table = FakeTable::with_procs(&[
            (100, "python3 idarling_server.py"),
            (101, "python3 idarling_server.py"),
        ]);
        table.deny.push(100);
        let mut supervisor = ProcessSupervisor::new(table, unprivileged_settings());

        // still two requests, the denial is swallowed
        assert_eq!(supervisor.terminate_matching("python3 idarling_server.py"), 2);
        assert_eq!(supervisor.table.signaled, vec![100, 101]);
    }

    #[test]
    fn test_any_argument_suppresses_the_relaunch() {
        let tempdir = tempfile::tempdir().expect("failed to create tempdir");
        let log_path = tempdir.path().join("server.log");

        let settings = Settings {
            log_path: log_path.clone(),
            ..unprivileged_settings()
        };
        let mut supervisor = ProcessSupervisor::new(FakeTable::default(), settings);

        let mut runtime = runtime::Builder::new()
            .basic_scheduler()
            .build()
            .expect("Failed to initialize Tokio Runtime");

        let args = vec![OsString::from("stop")];
        runtime
            .block_on(supervisor.maybe_start(&args))
            .expect("maybe_start should be a no-op");

        // not even the log file is touched
        assert!(!log_path.exists());
    }

    #[test]
    fn test_privilege_check_can_be_waived() {
        let supervisor = ProcessSupervisor::new(FakeTable::default(), unprivileged_settings());
        assert!(supervisor.check_privilege().is_ok());
    }

    #[test]
    fn test_privilege_check_requires_root() {
        if Uid::effective().is_root() {
            // nothing to assert when the test runner itself is root
            return;
        }

        let supervisor = ProcessSupervisor::new(FakeTable::default(), Settings::default());
        assert!(supervisor.check_privilege().is_err());
    }
}
