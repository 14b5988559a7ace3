//! Typed client for counter operations.

use crate::counter::command::CounterCommand;
use crate::counter::entry::CounterEntry;
use crate::error::{Error, Result};
use crate::network::rpc::{DirectRequest, DirectResponse, IndirectRequest, Message};
use crate::network::RpcClient;
use std::sync::Arc;

/// Issues counter commands through any node of the cluster.
///
/// Requests are sent as indirect requests, so the receiving node forwards
/// them to the key's master when it is not the master itself.
#[derive(Debug, Clone)]
pub struct CounterClient {
    rpc: Arc<dyn RpcClient>,
}

impl CounterClient {
    pub fn new(rpc: Arc<dyn RpcClient>) -> Self {
        Self { rpc }
    }

    /// Issue the next ticket for `key`.
    pub async fn increment(&self, key: impl Into<Vec<u8>>) -> Result<i64> {
        let resp = self
            .execute(key.into(), CounterCommand::Increment, Vec::new())
            .await?;
        Ok(bincode::deserialize(&resp.result)?)
    }

    /// Return `ticket` for `key`.
    pub async fn rollback(&self, key: impl Into<Vec<u8>>, ticket: i64) -> Result<()> {
        let args = bincode::serialize(&ticket)?;
        self.execute(key.into(), CounterCommand::Rollback, args)
            .await
            .map(|_| ())
    }

    pub async fn remold(&self, key: impl Into<Vec<u8>>, baseline: CounterEntry) -> Result<()> {
        self.execute(key.into(), CounterCommand::Remold, baseline.to_bytes()?)
            .await
            .map(|_| ())
    }

    pub async fn replace(&self, key: impl Into<Vec<u8>>, entry: CounterEntry) -> Result<()> {
        self.execute(key.into(), CounterCommand::Replace, entry.to_bytes()?)
            .await
            .map(|_| ())
    }

    async fn execute(
        &self,
        key: Vec<u8>,
        command: CounterCommand,
        args: Vec<u8>,
    ) -> Result<DirectResponse> {
        let request = IndirectRequest::new(DirectRequest::new(key, command, args));
        match self.rpc.call(Message::Indirect(request)).await? {
            Message::DirectResponse(resp) if resp.is_ok() => Ok(resp),
            Message::DirectResponse(resp) => Err(Error::Remote {
                status: resp.status(),
            }),
            _ => Err(Error::UnexpectedResponse("expected a direct response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::rpc::DirectStatus;
    use crate::testing::MockRpcClient;

    #[tokio::test]
    async fn test_increment_decodes_ticket() {
        let mock = Arc::new(MockRpcClient::new("10.0.0.1:7000".parse().unwrap()));
        mock.respond_with(Message::DirectResponse(DirectResponse::ok(
            bincode::serialize(&42i64).unwrap(),
        )));
        let client = CounterClient::new(mock.clone());

        assert_eq!(client.increment("k").await.unwrap(), 42);
        match &mock.calls()[0] {
            Message::Indirect(req) => {
                assert_eq!(req.to_master.key, b"k".to_vec());
                assert_eq!(req.to_master.command(), Some(CounterCommand::Increment));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_errno_maps_to_remote_error() {
        let mock = Arc::new(MockRpcClient::new("10.0.0.1:7000".parse().unwrap()));
        mock.respond_with(Message::DirectResponse(DirectResponse::error(
            DirectStatus::NoRing,
        )));
        let client = CounterClient::new(mock);

        let err = client.rollback("k", 3).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Remote {
                status: DirectStatus::NoRing
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_response_kind() {
        let mock = Arc::new(MockRpcClient::new("10.0.0.1:7000".parse().unwrap()));
        mock.respond_with(Message::Empty);
        let client = CounterClient::new(mock);
        assert!(matches!(
            client.replace("k", CounterEntry::EMPTY).await,
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mock = Arc::new(MockRpcClient::new("10.0.0.1:7000".parse().unwrap()));
        mock.set_fail(true);
        let client = CounterClient::new(mock);
        assert!(matches!(
            client.remold("k", CounterEntry::new(1, 0, 0)).await,
            Err(Error::Network(_))
        ));
    }
}
