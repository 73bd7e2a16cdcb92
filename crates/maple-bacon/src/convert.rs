//! Conversion between cached values and the bytes persisted by the disk tier.

use bytes::Bytes;

/// A value that can be stored in a [`Cache`](crate::Cache).
///
/// `decode` turns fetched or persisted bytes into a value and `encode` turns
/// it back. Returning `None` from either marks the data as unusable.
pub trait DataConvertible: Sized + Clone + Send + Sync + 'static {
    fn decode(data: &[u8]) -> Option<Self>;

    fn encode(&self) -> Option<Bytes>;

    /// Weight of the value in the memory tier when it is bounded by cost
    fn cost(&self) -> u32 {
        1
    }
}

fn len_cost(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl DataConvertible for Bytes {
    fn decode(data: &[u8]) -> Option<Self> {
        Some(Bytes::copy_from_slice(data))
    }

    fn encode(&self) -> Option<Bytes> {
        Some(self.clone())
    }

    fn cost(&self) -> u32 {
        len_cost(self.len())
    }
}

impl DataConvertible for Vec<u8> {
    fn decode(data: &[u8]) -> Option<Self> {
        Some(data.to_vec())
    }

    fn encode(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(self))
    }

    fn cost(&self) -> u32 {
        len_cost(self.len())
    }
}

impl DataConvertible for String {
    fn decode(data: &[u8]) -> Option<Self> {
        std::str::from_utf8(data).ok().map(str::to_owned)
    }

    fn encode(&self) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(self.as_bytes()))
    }

    fn cost(&self) -> u32 {
        len_cost(self.len())
    }
}
