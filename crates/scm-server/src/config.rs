//! Server-specific configuration: the pieces that layer on top of
//! `scm_config::ScmConfig` to turn it into a runnable process — bind
//! addresses, replica-group membership, and (optional) TLS material (§6).

use std::path::PathBuf;

use scm_consensus::types::ReplicaId;

use crate::error::{ServerError, ServerResult};

/// One peer in the consensus group, as named on the command line or in
/// the cluster config (`--peer <id>=<host>:<port>`).
#[derive(Debug, Clone)]
pub struct PeerAddress {
    pub replica_id: ReplicaId,
    pub address: String,
}

/// Everything `scm-server`'s `main` needs beyond `ScmConfig` to stand up a
/// replica process: which replica it is, who its peers are, and where to
/// listen for the two distinct RPC surfaces (§6 datanode/client RPC vs.
/// the inter-replica consensus port).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub scm: scm_config::ScmConfig,
    pub replica_id: ReplicaId,
    pub peers: Vec<PeerAddress>,
    /// Bind address for the datanode/client RPC surface (§6).
    pub rpc_bind_address: String,
    /// Bind address for inter-replica consensus traffic.
    pub peer_bind_address: String,
    pub tls: Option<crate::tls::TlsConfig>,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    /// Resolves the full group (self included) in replica-id order, the
    /// shape `scm_consensus::Replica::new` expects.
    pub fn group(&self) -> Vec<ReplicaId> {
        let mut ids: Vec<ReplicaId> = self.peers.iter().map(|p| p.replica_id).collect();
        ids.push(self.replica_id);
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn peer_address(&self, id: ReplicaId) -> ServerResult<&str> {
        self.peers
            .iter()
            .find(|p| p.replica_id == id)
            .map(|p| p.address.as_str())
            .ok_or_else(|| ServerError::Config(format!("no configured address for {id}")))
    }
}

/// Parses `<id>=<host>:<port>` command-line peer specs into
/// `PeerAddress`es.
pub fn parse_peer_spec(spec: &str) -> ServerResult<PeerAddress> {
    let (id_str, address) = spec
        .split_once('=')
        .ok_or_else(|| ServerError::Config(format!("malformed --peer spec {spec:?}, expected id=host:port")))?;
    let id: u8 = id_str
        .parse()
        .map_err(|_| ServerError::Config(format!("malformed replica id in --peer spec {spec:?}")))?;
    Ok(PeerAddress { replica_id: ReplicaId(id), address: address.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_peer_spec() {
        let peer = parse_peer_spec("2=10.0.0.3:9861").unwrap();
        assert_eq!(peer.replica_id, ReplicaId(2));
        assert_eq!(peer.address, "10.0.0.3:9861");
    }

    #[test]
    fn rejects_a_spec_with_no_equals_sign() {
        assert!(parse_peer_spec("10.0.0.3:9861").is_err());
    }

    #[test]
    fn group_includes_self_and_dedupes() {
        let config = ServerConfig {
            scm: scm_config::ScmConfig::default(),
            replica_id: ReplicaId(0),
            peers: vec![
                PeerAddress { replica_id: ReplicaId(1), address: "a".into() },
                PeerAddress { replica_id: ReplicaId(0), address: "b".into() },
            ],
            rpc_bind_address: "127.0.0.1:9860".into(),
            peer_bind_address: "127.0.0.1:9861".into(),
            tls: None,
            data_dir: PathBuf::from("/tmp/scm"),
        };
        assert_eq!(config.group(), vec![ReplicaId(0), ReplicaId(1)]);
    }
}
