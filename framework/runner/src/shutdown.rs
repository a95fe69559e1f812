use chain_tunnel_core::prelude::ShutdownHandle;
use tokio::signal;

pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, stop the run with the duration instead: {e}");
            return;
        }
        listener_handle.shutdown();
        println!("Received shutdown signal, finishing in-flight requests...");
    });

    Ok(handle)
}
