//! Ctrl+C handling for the long running commands

use std::thread;

use anyhow::Context;
use tokio::runtime::Runtime;

#[cfg(unix)]
type Listener = tokio::signal::unix::Signal;
#[cfg(windows)]
type Listener = tokio::signal::windows::CtrlC;

/// Installs the Ctrl+C handler right away, before returning.
#[cfg(unix)]
fn listen(runtime: &Runtime) -> std::io::Result<Listener> {
    let _guard = runtime.enter();
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
}

#[cfg(windows)]
fn listen(runtime: &Runtime) -> std::io::Result<Listener> {
    let _guard = runtime.enter();
    tokio::signal::windows::ctrl_c()
}

/// Listens for Ctrl+C on a background thread and exits the process cleanly when it arrives.
///
/// The handler is in place once this returns. A running extraction tool receives the same
/// signal from the terminal and stops on its own.
pub fn exit_on_ctrl_c(message: &'static str) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    let mut listener = listen(&runtime).context("failed to listen for Ctrl+C")?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if listener.recv().await.is_some() {
                    println!("\n\n{message}");
                    std::process::exit(0);
                }
            })
        })
        .context("failed to spawn signal thread")?;

    Ok(())
}
