use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::error::SqlBatchError;

pub type MssqlClient = Client<Compat<TcpStream>>;

async fn tcp_connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Compat<TcpStream>, SqlBatchError> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| SqlBatchError::ConnectionError(format!("TCP connection error: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| SqlBatchError::ConnectionError(format!("TCP configuration error: {e}")))?;
    Ok(tcp.compat_write())
}

/// Open a client from an ADO.NET connection string, following one server redirect.
///
/// # Errors
/// Returns `SqlBatchError::ConfigError` for an unparsable connection string and
/// `SqlBatchError::ConnectionError` when the server cannot be reached or rejects the login.
pub async fn connect_ado(connection_string: &str) -> Result<MssqlClient, SqlBatchError> {
    let mut config = Config::from_ado_string(connection_string)
        .map_err(|e| SqlBatchError::ConfigError(format!("invalid SQL Server connection string: {e}")))?;

    let tcp = tcp_connect(config.get_addr()).await?;
    match Client::connect(config.clone(), tcp).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(%host, port, "SQL Server redirected the connection");
            config.host(&host);
            config.port(port);
            let tcp = tcp_connect(config.get_addr()).await?;
            Client::connect(config, tcp).await.map_err(|e| {
                SqlBatchError::ConnectionError(format!("SQL Server connection error: {e}"))
            })
        }
        Err(e) => Err(SqlBatchError::ConnectionError(format!(
            "SQL Server connection error: {e}"
        ))),
    }
}
