use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use jsmirror::{
    wire::{
        tcp::{V8Connection, V8ConnectionConfig},
        MessageChannel, SendMode,
    },
    DebugSession, JsValue, Resolution, ResolverOptions, Variable,
};
use jsmirror_config::JsMirrorConfig;

/// Prints the call stack and variables of a suspended V8 VM.
///
/// The VM must already be paused (for example on a `debugger;` statement)
/// and listening on its debug port.
#[derive(Debug, Parser)]
#[command(name = "jsmirror-inspect", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `JSMIRROR_CONFIG` is used as a fallback. When neither is
    /// provided, built-in defaults apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `connection.host`.
    #[arg(long)]
    host: Option<String>,

    /// Overrides `connection.port`.
    #[arg(long)]
    port: Option<u16>,

    /// How many levels of object properties to expand.
    #[arg(long, default_value_t = 1)]
    depth: usize,

    /// Overrides `resolver.backtrace_frames`.
    #[arg(long)]
    frames: Option<u32>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config);
    if let Some(host) = cli.host {
        config.connection.host = host;
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(frames) = cli.frames {
        config.resolver.backtrace_frames = frames;
    }
    jsmirror_config::init_tracing(&config.logging);

    let address = config.connection.address();
    let addr = tokio::net::lookup_host(&address)
        .await
        .with_context(|| format!("failed to resolve {address}"))?
        .next()
        .with_context(|| format!("{address} did not resolve to any address"))?;
    let connection = V8Connection::connect_with_config(
        addr,
        V8ConnectionConfig {
            connect_timeout: config.connection.connect_timeout(),
            reply_timeout: config.connection.reply_timeout(),
            ..V8ConnectionConfig::default()
        },
    )
    .await
    .with_context(|| format!("failed to connect to V8 debugger at {addr}"))?;

    let channel: Arc<dyn MessageChannel> = connection.channel();
    // Printing walks the tree right after each expansion, so replies must
    // have landed by the time `expand` returns.
    let options = ResolverOptions {
        send_mode: SendMode::Sync,
        ..ResolverOptions::from(&config.resolver)
    };
    let frames = config.resolver.backtrace_frames;
    let depth = cli.depth;

    // Synchronous sends block their thread; keep them off the runtime workers.
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let session = DebugSession::new(channel, options);
        let frames = session
            .request_backtrace(0, frames)
            .context("backtrace request failed")?;

        let mut out = String::new();
        for frame in &frames {
            frame.ensure_variables()?;
            let line = line_suffix(frame.line());
            writeln!(out, "#{} {}{line}", frame.index(), frame.function_name())?;
            for variable in frame.variables() {
                render(&mut out, variable, 1, depth)?;
            }
        }
        Ok(out)
    })
    .await??;

    print!("{report}");
    connection.shutdown();
    Ok(())
}

/// `:N` with a one-based line, or nothing when the VM sent no line.
fn line_suffix(line: Option<u32>) -> String {
    line.map(|line| format!(":{}", line.saturating_add(1)))
        .unwrap_or_default()
}

fn render(
    out: &mut String,
    variable: &Arc<Variable>,
    indent: usize,
    depth: usize,
) -> std::fmt::Result {
    if depth > 0 {
        variable.expand();
    }

    let summary = match variable.value() {
        Some(JsValue::Primitive { value_type, text }) => format!("{value_type} {text}"),
        Some(value) => value
            .class_name()
            .unwrap_or(value.value_type().as_str())
            .to_string(),
        None if variable.resolution() == Resolution::Failed => "<unavailable>".to_string(),
        None => variable
            .class_name()
            .or_else(|| variable.declared_type().map(|ty| ty.to_string()))
            .unwrap_or_else(|| "?".to_string()),
    };
    writeln!(
        out,
        "{:indent$}{}: {summary}",
        "",
        variable.name(),
        indent = indent * 2
    )?;

    if depth > 0 {
        for child in variable.children() {
            render(out, &child, indent + 1, depth - 1)?;
        }
    }
    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> JsMirrorConfig {
    let path = cli_path.or_else(|| std::env::var_os("JSMIRROR_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return JsMirrorConfig::default();
    };

    match JsMirrorConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "jsmirror-inspect: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            JsMirrorConfig::default()
        }
    }
}
