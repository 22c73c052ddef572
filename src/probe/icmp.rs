//! ICMP echo reachability check

use log::{debug, warn};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::sync::OnceCell;
use tokio::time::timeout;

const PAYLOAD: [u8; 56] = [0u8; 56];

/// Single-echo pinger. The socket is opened on first use; when the process
/// may not open an ICMP socket every host reads as unreachable.
pub struct IcmpProbe {
    client: OnceCell<Option<Client>>,
}

impl IcmpProbe {
    pub fn new() -> Self {
        Self {
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Option<&Client> {
        self.client
            .get_or_init(|| async {
                match Client::new(&Config::default()) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        warn!("ICMP socket unavailable ({}), hosts will read as unreachable", e);
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Send one echo request and wait up to `wait` for the reply
    pub async fn echo(&self, addr: IpAddr, wait: Duration) -> bool {
        if !addr.is_ipv4() {
            return false;
        }

        let Some(client) = self.client().await else {
            return false;
        };

        let identifier = PingIdentifier(uuid::Uuid::new_v4().as_u128() as u16);
        let mut pinger = client.pinger(addr, identifier).await;
        pinger.timeout(wait);

        match timeout(wait + Duration::from_millis(100), pinger.ping(PingSequence(0), &PAYLOAD)).await {
            Ok(Ok((_, rtt))) => {
                debug!("{} answered echo in {:?}", addr, rtt);
                true
            }
            Ok(Err(e)) => {
                debug!("{} did not answer echo: {}", addr, e);
                false
            }
            Err(_) => false,
        }
    }
}

impl Default for IcmpProbe {
    fn default() -> Self {
        Self::new()
    }
}
