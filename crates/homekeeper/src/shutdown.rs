use tokio::sync::watch;

/// Resolve once `shutdown` holds `true` or its sender is gone.
pub async fn requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
