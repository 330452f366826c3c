use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;

use tokio::fs::create_dir_all;

/// Makes sure the directory holding the database file exists.
pub async fn prepare_data_dir(db_file: &Path) -> std::io::Result<()> {
    match db_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => create_dir_all(dir).await,
        _ => Ok(()),
    }
}

/// Binds the configured port, or an OS-assigned one when it is taken.
pub fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    match TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))) {
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            log::warn!(
                "Port {} in use, attempting to listen on a random free port instead.",
                port
            );
            TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
        }
        other => other,
    }
}
