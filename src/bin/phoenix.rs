// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;

use clap::{App, AppSettings, Arg};
use tokio::runtime;

use phoenixrc::settings::Settings;
use phoenixrc::supervisor::ProcessSupervisor;
use phoenixrc::table::SysProcessTable;
use phoenixrc::Error;

const ALLOW_UNPRIVILEGED: &str = "allow-unprivileged";
const FREE_ARGS: &str = "args";

fn main() -> Result<(), Error> {
    let args = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        // free arguments are unvalidated, a hyphen-leading token is still
        // just a token that suppresses the relaunch
        .setting(AppSettings::AllowLeadingHyphen)
        .arg(
            Arg::with_name(ALLOW_UNPRIVILEGED)
                .long(ALLOW_UNPRIVILEGED)
                .help("skip the root precondition check"),
        )
        .arg(
            Arg::with_name(FREE_ARGS)
                .multiple(true)
                .help("free arguments are never parsed, any of them stops the server without relaunching it"),
        )
        .get_matches();

    let mut settings = Settings::default();
    if args.is_present(ALLOW_UNPRIVILEGED) {
        settings.require_root = false;
    }

    let free_args: Vec<OsString> = args
        .values_of_os(FREE_ARGS)
        .map(|values| values.map(OsString::from).collect())
        .unwrap_or_default();

    let mut runtime = runtime::Builder::new()
        .basic_scheduler()
        .enable_io()
        .build()
        .expect("Failed to initialize Tokio Runtime");

    runtime.block_on(async move {
        let pattern = settings.pattern.clone();
        let mut supervisor = ProcessSupervisor::new(SysProcessTable::new(), settings);

        supervisor.check_privilege()?;

        let requested = supervisor.terminate_matching(&pattern);
        println!("requested termination of {} process(es)", requested);

        supervisor.maybe_start(&free_args).await
    })
}
