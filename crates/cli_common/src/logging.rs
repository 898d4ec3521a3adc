/// Logging flags shared by every catalog subcommand.
#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// Log filter, either a level (trace|debug|info|warn|error|off) or a
    /// full directive such as "warn,mutations=debug".
    #[arg(long = "log-level", default_value = "warn", global = true)]
    pub level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long = "log-json", global = true)]
    pub json: bool,
}

/// Install the global subscriber, writing to stderr. Text output is
/// colored when stderr is a terminal; JSON output keeps the structured
/// fields of catalog events (scope, package, channel, bundle) intact for
/// log collectors. Panics if called twice.
pub fn init_logging(args: &LogArgs) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.level.as_str())
        .with_target(false);

    if args.json {
        builder.json().flatten_event(true).init();
    } else {
        builder
            .compact()
            .with_ansi(atty::is(atty::Stream::Stderr))
            .init();
    }
}

/// Log every row of an aggregated catalog error table, one line per row
/// with the scope URL locating the offending entity. Rows log at error
/// level when they are about to fail the command, and at warn level when
/// the command proceeds without the broken packages.
pub fn report_errors(errors: &tables::Errors, fatal: bool) {
    for row in errors.iter() {
        if fatal {
            tracing::error!(scope = %row.scope, error = %format!("{:#}", row.error), "catalog error");
        } else {
            tracing::warn!(scope = %row.scope, error = %format!("{:#}", row.error), "catalog error");
        }
    }
}
