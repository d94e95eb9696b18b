//! Locating and rewriting the configuration slots of a launcher binary.
//!
//! A slot is a fixed 16-byte tag followed by a NUL-padded value region. The
//! layout has to match `Slot` in the locale-launcher crate.

use anyhow::{anyhow, bail, Result};

pub struct SlotSpec {
    pub name: &'static str,
    pub tag: &'static [u8; 16],
    /// Size of the value region, including the mandatory trailing NUL.
    pub size: usize,
}

pub const TARGET: SlotSpec = SlotSpec {
    name: "target",
    tag: b"LAUNCHER_TARGET=",
    size: 256,
};

pub const ARG0: SlotSpec = SlotSpec {
    name: "arg0",
    tag: b"LAUNCHER_ARG0=\0\0",
    size: 64,
};

fn find_pattern(data: &[u8], pattern: &[u8]) -> Option<usize> {
    data.windows(pattern.len())
        .position(|window| window == pattern)
}

fn replace_at(data: &mut [u8], offset: usize, new_value: &[u8], fixed_size: usize) {
    data[offset..offset + fixed_size].fill(0);
    data[offset..offset + new_value.len()].copy_from_slice(new_value);
}

impl SlotSpec {
    /// Offset of the value region. The tag has to occur exactly once.
    pub fn locate(&self, data: &[u8]) -> Result<usize> {
        let tag_pos = find_pattern(data, self.tag)
            .ok_or_else(|| anyhow!("{} slot not found, not a locale-launcher binary", self.name))?;
        let offset = tag_pos + self.tag.len();

        if find_pattern(&data[offset..], self.tag).is_some() {
            bail!("{} slot tag occurs more than once", self.name);
        }
        if offset + self.size > data.len() {
            bail!("{} slot is truncated", self.name);
        }

        Ok(offset)
    }

    /// Current value without its NUL padding, `None` when unset.
    pub fn read<'a>(&self, data: &'a [u8]) -> Result<Option<&'a [u8]>> {
        let offset = self.locate(data)?;
        let region = &data[offset..offset + self.size];
        let len = region.iter().position(|&b| b == 0).unwrap_or(region.len());
        Ok((len > 0).then(|| &region[..len]))
    }

    pub fn check(&self, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            bail!("{} must not be empty", self.name);
        }
        if value.contains(&0) {
            bail!("{} must not contain NUL bytes", self.name);
        }
        if value.len() >= self.size {
            bail!(
                "{} too long: {} bytes > {} bytes max",
                self.name,
                value.len(),
                self.size - 1
            );
        }
        Ok(())
    }

    /// Overwrites the slot with `value` and returns what was there before.
    pub fn write(&self, data: &mut [u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check(value)?;
        let previous = self.read(data)?.map(<[u8]>::to_vec);
        let offset = self.locate(data)?;
        replace_at(data, offset, value, self.size);
        Ok(previous)
    }
}

/// Bytes shaped like an unfinalized launcher: both slots empty, surrounded by code.
#[cfg(test)]
pub(crate) fn fake_template() -> Vec<u8> {
    let mut data = b"\x7fELF junk before".to_vec();
    data.extend_from_slice(TARGET.tag);
    data.extend(std::iter::repeat(0).take(TARGET.size));
    data.extend_from_slice(ARG0.tag);
    data.extend(std::iter::repeat(0).take(ARG0.size));
    data.extend_from_slice(b"junk after");
    data
}
