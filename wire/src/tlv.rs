// Minimal TLV passthrough for unknown fields. BOLT-1 requires unknown *even*
// types to be treated as an error and unknown *odd* types to be ignored (and,
// where the surrounding message is re-serialized, preserved verbatim).

use std::collections::BTreeMap;
use std::io;

use lightning_encoding::{BigSize, LightningDecode, LightningEncode};

/// An ordered set of TLV records not recognized by the local decoder,
/// indexed by their BigSize type.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
pub struct Stream(BTreeMap<u64, Vec<u8>>);

impl Stream {
    pub fn insert(&mut self, ty: u64, value: Vec<u8>) -> bool {
        self.0.insert(ty, value).is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Vec<u8>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Even-typed unknown records MUST be rejected per BOLT-1.
    pub fn has_unknown_even(&self) -> Option<u64> {
        self.0.keys().find(|ty| *ty % 2 == 0).copied()
    }
}

impl LightningEncode for Stream {
    fn lightning_encode<E: io::Write>(&self, mut e: E) -> Result<usize, lightning_encoding::Error> {
        let mut len = 0;
        for (ty, value) in &self.0 {
            len += BigSize::from(*ty).lightning_encode(&mut e)?;
            len += BigSize::from(value.len() as u64).lightning_encode(&mut e)?;
            e.write_all(value)?;
            len += value.len();
        }
        Ok(len)
    }
}

impl LightningDecode for Stream {
    fn lightning_decode<D: io::Read>(mut d: D) -> Result<Self, lightning_encoding::Error> {
        let mut map = BTreeMap::new();
        loop {
            let ty = match BigSize::lightning_decode(&mut d) {
                Ok(ty) => ty.value(),
                Err(_) => break,
            };
            let len = BigSize::lightning_decode(&mut d)?.value();
            let mut buf = vec![0u8; len as usize];
            d.read_exact(&mut buf)?;
            map.insert(ty, buf);
        }
        Ok(Stream(map))
    }
}
