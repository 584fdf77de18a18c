//! GET_VALUES management queries.
//!
//! The peer sends a GET_VALUES record whose content is a name-value block
//! with empty values; the reply is a GET_VALUES_RESULT record carrying the
//! values this engine knows. Unknown names are left out of the reply.

use super::params::{encode_param, Params};

/// Maximum concurrent transport connections.
pub const FCGI_MAX_CONNS: &[u8] = b"FCGI_MAX_CONNS";
/// Maximum concurrent requests.
pub const FCGI_MAX_REQS: &[u8] = b"FCGI_MAX_REQS";
/// Whether requests are multiplexed over one connection.
pub const FCGI_MPXS_CONNS: &[u8] = b"FCGI_MPXS_CONNS";

/// Values advertised in GET_VALUES_RESULT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerValues {
    pub max_conns: usize,
    pub max_reqs: usize,
    pub mpxs_conns: bool,
}

impl ServerValues {
    /// Values for a pool of `capacity` slots with one request per connection.
    pub fn for_pool(capacity: usize) -> Self {
        Self {
            max_conns: capacity,
            max_reqs: capacity,
            mpxs_conns: false,
        }
    }

    fn lookup(&self, name: &[u8]) -> Option<String> {
        match name {
            FCGI_MAX_CONNS => Some(self.max_conns.to_string()),
            FCGI_MAX_REQS => Some(self.max_reqs.to_string()),
            FCGI_MPXS_CONNS => Some(if self.mpxs_conns { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    /// Build the GET_VALUES_RESULT content for a GET_VALUES query block.
    ///
    /// A malformed query is answered up to the first bad pair.
    pub fn answer(&self, query: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for param in Params::new(query).map_while(|p| p.ok()) {
            if let Some(value) = self.lookup(param.name) {
                encode_param(&mut out, param.name, value.as_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(names: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for name in names {
            encode_param(&mut out, name, b"");
        }
        out
    }

    #[test]
    fn test_answer_known_values() {
        let values = ServerValues::for_pool(1024);
        let reply = values.answer(&query(&[FCGI_MAX_CONNS, FCGI_MPXS_CONNS]));

        let params = Params::new(&reply);
        assert_eq!(params.get(FCGI_MAX_CONNS), Some(&b"1024"[..]));
        assert_eq!(params.get(FCGI_MPXS_CONNS), Some(&b"0"[..]));
        assert_eq!(params.get(FCGI_MAX_REQS), None);
    }

    #[test]
    fn test_unknown_names_are_omitted() {
        let values = ServerValues::for_pool(8);
        let reply = values.answer(&query(&[&b"FCGI_SOMETHING_ELSE"[..]]));
        assert!(reply.is_empty());
    }

    #[test]
    fn test_empty_query() {
        assert!(ServerValues::for_pool(8).answer(&[]).is_empty());
    }
}
