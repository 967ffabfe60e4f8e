use tracing::{debug, warn};

use crate::error::{Rt11Error, Rt11Result};
use crate::{BLOCK_SIZE, get_word, put_word, radix50};

/// Block holding the home block.
pub const HOME_BLOCK: u32 = 1;
/// First directory segment block; anything else is a fault.
pub const FIRST_DIR_BLOCK: u32 = 6;

const PACK_CLUSTER_OFFSET: usize = 0o722;
const FIRST_DIR_OFFSET: usize = 0o724;
const SYSTEM_VERSION_OFFSET: usize = 0o726;
const VOLUME_ID_OFFSET: usize = 0o730;
const OWNER_OFFSET: usize = 0o744;
const SYSTEM_ID_OFFSET: usize = 0o760;
const CHECKSUM_OFFSET: usize = 0o776;
const ID_LEN: usize = 12;

/// Default volume identification.
pub const DEFAULT_VOLUME_ID: &str = "RT11A";
/// Default system identification.
pub const DEFAULT_SYSTEM_ID: &str = "DECRT11A";
/// Default system version, stored as Radix-50.
pub const DEFAULT_SYSTEM_VERSION: &str = "V3A";

/// Decoded home block.
///
/// The raw block is kept so that areas not interpreted here (bad block
/// replacement table, INIT/RESTORE area) survive a render unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeBlock {
    /// Pack cluster size.
    pub pack_cluster_size: u16,
    /// Block number of directory segment 1.
    pub first_dir_block: u16,
    /// System version, three Radix-50 characters.
    pub system_version: String,
    /// Volume identification, up to 12 ASCII characters.
    pub volume_id: String,
    /// Owner name, up to 12 ASCII characters.
    pub owner_name: String,
    /// System identification, up to 12 ASCII characters.
    pub system_id: String,
    raw: Vec<u8>,
}

impl Default for HomeBlock {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME_ID, "", DEFAULT_SYSTEM_ID)
    }
}

fn ascii_field(buf: &[u8], offset: usize) -> String {
    String::from_utf8_lossy(&buf[offset..][..ID_LEN])
        .trim_end_matches([' ', '\0'])
        .to_owned()
}

fn put_ascii_field(buf: &mut [u8], offset: usize, value: &str) {
    let field = &mut buf[offset..][..ID_LEN];
    field.fill(b' ');
    for (dst, src) in field.iter_mut().zip(value.bytes().filter(u8::is_ascii)) {
        *dst = src;
    }
}

/// Sum of the first 255 words modulo 2^16.
#[must_use]
pub fn checksum(block: &[u8]) -> u16 {
    (0..CHECKSUM_OFFSET)
        .step_by(2)
        .fold(0u16, |sum, offset| sum.wrapping_add(get_word(block, offset)))
}

impl HomeBlock {
    /// A fresh home block with the given identifiers.
    #[must_use]
    pub fn new(volume_id: &str, owner_name: &str, system_id: &str) -> Self {
        Self {
            pack_cluster_size: 1,
            first_dir_block: 6,
            system_version: DEFAULT_SYSTEM_VERSION.to_owned(),
            volume_id: volume_id.to_owned(),
            owner_name: owner_name.to_owned(),
            system_id: system_id.to_owned(),
            raw: vec![0; BLOCK_SIZE],
        }
    }

    /// Decode block 1.
    ///
    /// Returns `Ok(None)` for an all-zero block (unformatted volume).
    ///
    /// # Errors
    ///
    /// Returns [`Rt11Error::Structural`] if the stored checksum is non-zero
    /// and wrong, or if the first directory block is not 6. A zero checksum
    /// is accepted.
    pub fn decode(block: &[u8]) -> Rt11Result<Option<Self>> {
        if block.len() < BLOCK_SIZE {
            return Err(Rt11Error::Structural(format!(
                "home block is {} bytes",
                block.len()
            )));
        }
        if block.iter().all(|b| *b == 0) {
            debug!("Home block is empty, volume not formatted");
            return Ok(None);
        }
        let stored = get_word(block, CHECKSUM_OFFSET);
        let computed = checksum(block);
        if stored != 0 && stored != computed {
            return Err(Rt11Error::Structural(format!(
                "home block checksum {stored:#06o} does not match computed {computed:#06o}"
            )));
        }
        if stored == 0 && computed != 0 {
            warn!("Home block checksum is zero, accepting");
        }
        let first_dir_block = get_word(block, FIRST_DIR_OFFSET);
        if u32::from(first_dir_block) != FIRST_DIR_BLOCK {
            return Err(Rt11Error::Structural(format!(
                "first directory block is {first_dir_block}, expected {FIRST_DIR_BLOCK}"
            )));
        }
        Ok(Some(Self {
            pack_cluster_size: get_word(block, PACK_CLUSTER_OFFSET),
            first_dir_block,
            system_version: radix50::decode(&[get_word(block, SYSTEM_VERSION_OFFSET)]),
            volume_id: ascii_field(block, VOLUME_ID_OFFSET),
            owner_name: ascii_field(block, OWNER_OFFSET),
            system_id: ascii_field(block, SYSTEM_ID_OFFSET),
            raw: block[..BLOCK_SIZE].to_vec(),
        }))
    }

    /// Encode into a block, recomputing the checksum.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut block = self.raw.clone();
        block.resize(BLOCK_SIZE, 0);
        put_word(&mut block, PACK_CLUSTER_OFFSET, self.pack_cluster_size);
        put_word(&mut block, FIRST_DIR_OFFSET, self.first_dir_block);
        put_word(
            &mut block,
            SYSTEM_VERSION_OFFSET,
            radix50::encode_word(&self.system_version),
        );
        put_ascii_field(&mut block, VOLUME_ID_OFFSET, &self.volume_id);
        put_ascii_field(&mut block, OWNER_OFFSET, &self.owner_name);
        put_ascii_field(&mut block, SYSTEM_ID_OFFSET, &self.system_id);
        let sum = checksum(&block);
        put_word(&mut block, CHECKSUM_OFFSET, sum);
        block
    }
}
