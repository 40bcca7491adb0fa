
//! The property list section:
//! a table of utf16 name/value string pairs,
//! for example `AEMODE` -> `8` or `CAMMODEL` -> `SIGMA DP2 Merrill`.

use crate::error::{Error, Result};
use crate::io::Data;
use crate::meta::PropertyInfo;


/// A decoded property list.
/// Strings are converted from utf16 to utf8 once, at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyList {

    /// The character encoding tag from the section header.
    pub character_format: u32,

    properties: Vec<(String, String)>,
}

impl PropertyList {

    /// All name/value pairs, in file order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the list holds no pairs at all.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Look up the value of the property with the given name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.properties.iter()
            .find(|(property, _)| property == name)
            .map(|(_, value)| value.as_str())
    }

    /// Decode the payload of a property list section.
    pub(crate) fn parse(info: &PropertyInfo, payload: &[u8]) -> Result<Self> {
        // only the utf16 character format was ever written
        if info.character_format != 0 {
            return Err(Error::property("unknown character format"));
        }

        let count = info.num_properties as usize;
        let offsets_length = count.checked_mul(8)
            .filter(|&length| length <= payload.len())
            .ok_or_else(|| Error::property("offset table exceeds the section"))?;

        let (mut offset_bytes, mut pool_bytes) = payload.split_at(offsets_length);

        // the character pool is a sequence of little endian utf16 units
        let pool_bytes_len = pool_bytes.len();
        let pool = u16::read_vec(
            &mut pool_bytes, pool_bytes_len / 2,
            pool_bytes_len, "character pool",
        )?;

        if u64::from(info.total_length) > pool.len() as u64 {
            log::debug!(
                "property pool declares {} units but holds {}",
                info.total_length, pool.len()
            );
        }

        let mut properties = Vec::with_capacity(count);

        for _ in 0 .. count {
            let name_offset = u32::read(&mut offset_bytes)?;
            let value_offset = u32::read(&mut offset_bytes)?;

            properties.push((
                terminated_utf16(&pool, name_offset)?,
                terminated_utf16(&pool, value_offset)?,
            ));
        }

        Ok(Self { character_format: info.character_format, properties })
    }
}

/// Extract the nul terminated utf16 string
/// at the given unit offset into the pool.
fn terminated_utf16(pool: &[u16], offset: u32) -> Result<String> {
    let tail = pool.get(offset as usize ..)
        .ok_or_else(|| Error::property("string offset outside the character pool"))?;

    let length = tail.iter().position(|&unit| unit == 0)
        .ok_or_else(|| Error::property("unterminated string"))?;

    String::from_utf16(&tail[.. length])
        .map_err(|_| Error::property("string is not valid utf16"))
}
