//! IMAP command handlers for the fake server.
//!
//! One module per command the client library issues: LOGIN, ID, LIST,
//! SELECT, UID SEARCH, UID FETCH and LOGOUT.

mod id;
mod select;
mod uid_search;

pub use id::{handle_id, id_command_tag};
pub use list::handle_list;
pub use login::handle_login;
pub use logout::handle_logout;
pub use select::handle_select;
pub use uid_fetch::handle_uid_fetch;
pub use uid_search::handle_uid_search;

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, BufReader, DuplexStream};

    /// Run a handler against an in-memory stream and collect what it
    /// wrote to the client.
    pub async fn capture<F, Fut, T>(handler: F) -> (String, T)
    where
        F: FnOnce(BufReader<DuplexStream>) -> Fut,
        Fut: std::future::Future<Output = (BufReader<DuplexStream>, T)>,
    {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (stream, value) = handler(BufReader::new(server)).await;
        drop(stream);

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        (String::from_utf8(buf).unwrap(), value)
    }
}
