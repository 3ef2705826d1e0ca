//! One line of the leases file.
//!
//! dnsmasq writes DHCPv4 leases as
//! `<expiry> <mac> <ip> <hostname> <client-id>`, with `*` standing in for an
//! unknown hostname or client id. A `duid <server-duid>` line starts the
//! DHCPv6 section, whose records use a different layout
//! (`<expiry> <iaid> <ipv6> <hostname> <client-duid>`).
use exporter_core::LeaseLabels;

/// token starting the DHCPv6 section
pub const DUID: &str = "duid";

/// minimum number of fields in a DHCPv4 lease line
pub const LEASE_FIELDS: usize = 5;

/// expiry recorded when the first field is not a number
pub const UNPARSABLE_EXPIRY: f64 = -1.;

/// A parsed DHCPv4 lease
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseRecord {
    /// seconds since the epoch, [`UNPARSABLE_EXPIRY`] if unparsable
    pub expiry: f64,
    pub mac_address: String,
    pub ip_address: String,
    pub computer_name: String,
    pub client_id: String,
}

/// What a single line turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// start of the DHCPv6 section, scanning stops here
    Duid,
    /// fewer than [`LEASE_FIELDS`] fields
    Malformed,
    Lease(LeaseRecord),
}

impl LeaseRecord {
    /// Classify one line of the leases file. Fields past the fifth are ignored.
    pub fn parse(line: &str) -> ParsedLine {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        match fields[..] {
            [DUID, ..] => ParsedLine::Duid,
            [expiry, mac, ip, name, client_id, ..] => ParsedLine::Lease(LeaseRecord {
                expiry: expiry.parse().unwrap_or(UNPARSABLE_EXPIRY),
                mac_address: mac.to_owned(),
                ip_address: ip.to_owned(),
                computer_name: name.to_owned(),
                client_id: client_id.to_owned(),
            }),
            _ => ParsedLine::Malformed,
        }
    }

    /// series identity in `dnsmasq_lease_expiry`
    pub fn labels(&self) -> LeaseLabels<'_> {
        LeaseLabels {
            mac_address: &self.mac_address,
            ip_address: &self.ip_address,
            computer_name: &self.computer_name,
            client_id: &self.client_id,
        }
    }
}
