//! Key hash functions.
//!
//! Every algorithm maps an arbitrary byte string to a `u32` and is stable
//! across processes and machines, so clients that share a server list agree
//! on key ownership. The values match libmemcached's `hashkit` for the same
//! algorithm.

use crate::md5::md5;

const FNV_32_INIT: u32 = 0x811c_9dc5;
const FNV_32_PRIME: u32 = 0x0100_0193;
const FNV_64_INIT: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash algorithm used for key routing or for continuum point generation.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// Jenkins one-at-a-time.
    #[default]
    Default,
    /// First four bytes of the MD5 digest, little-endian.
    Md5,
    /// Upper 15 bits of CRC-32, never zero.
    Crc,
    Fnv1_64,
    Fnv1a_64,
    Fnv1_32,
    Fnv1a_32,
    /// MurmurHash2 with a length-derived seed.
    Murmur,
}

impl HashAlgorithm {
    /// All supported algorithms, in a fixed order.
    pub const ALL: [HashAlgorithm; 8] = [
        HashAlgorithm::Default,
        HashAlgorithm::Md5,
        HashAlgorithm::Crc,
        HashAlgorithm::Fnv1_64,
        HashAlgorithm::Fnv1a_64,
        HashAlgorithm::Fnv1_32,
        HashAlgorithm::Fnv1a_32,
        HashAlgorithm::Murmur,
    ];

    /// Hash `data` to a 32-bit ring position.
    pub fn digest(&self, data: &[u8]) -> u32 {
        match self {
            HashAlgorithm::Default => one_at_a_time(data),
            HashAlgorithm::Md5 => {
                let d = md5(data);
                u32::from_le_bytes([d[0], d[1], d[2], d[3]])
            }
            HashAlgorithm::Crc => match (crc32fast::hash(data) >> 16) & 0x7fff {
                0 => 1,
                h => h,
            },
            HashAlgorithm::Fnv1_64 => {
                let h = data.iter().fold(FNV_64_INIT, |h, &b| {
                    h.wrapping_mul(FNV_64_PRIME) ^ u64::from(b)
                });
                h as u32
            }
            HashAlgorithm::Fnv1a_64 => {
                let h = data.iter().fold(FNV_64_INIT, |h, &b| {
                    (h ^ u64::from(b)).wrapping_mul(FNV_64_PRIME)
                });
                h as u32
            }
            HashAlgorithm::Fnv1_32 => data.iter().fold(FNV_32_INIT, |h, &b| {
                h.wrapping_mul(FNV_32_PRIME) ^ u32::from(b)
            }),
            HashAlgorithm::Fnv1a_32 => data.iter().fold(FNV_32_INIT, |h, &b| {
                (h ^ u32::from(b)).wrapping_mul(FNV_32_PRIME)
            }),
            HashAlgorithm::Murmur => murmur2(data),
        }
    }

    /// Lowercase name, as used in server list and behavior strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Default => "default",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Crc => "crc",
            HashAlgorithm::Fnv1_64 => "fnv1_64",
            HashAlgorithm::Fnv1a_64 => "fnv1a_64",
            HashAlgorithm::Fnv1_32 => "fnv1_32",
            HashAlgorithm::Fnv1a_32 => "fnv1a_32",
            HashAlgorithm::Murmur => "murmur",
        }
    }

    /// Look up an algorithm by its [`as_str`](Self::as_str) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name))
    }
}

fn one_at_a_time(data: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in data {
        h = h.wrapping_add(u32::from(b));
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}

fn murmur2(data: &[u8]) -> u32 {
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let len = data.len() as u32;
    let seed = 0xdead_beef_u32.wrapping_mul(len);
    let mut h = seed ^ len;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M) ^ k;
    }

    let tail = chunks.remainder();
    if tail.len() == 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^ (h >> 15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let cases: &[(HashAlgorithm, &[u8], u32)] = &[
            (HashAlgorithm::Default, b"apple", 2297466611),
            (HashAlgorithm::Md5, b"apple", 3195025439),
            (HashAlgorithm::Crc, b"apple", 10542),
            (HashAlgorithm::Fnv1_64, b"apple", 0x1c34_7217),
            (HashAlgorithm::Fnv1a_64, b"apple", 0x58be_fdbf),
            (HashAlgorithm::Fnv1_32, b"apple", 0x0401_0657),
            (HashAlgorithm::Fnv1a_32, b"apple", 0x10bc_2abf),
            (HashAlgorithm::Murmur, b"apple", 4142305122),
            (HashAlgorithm::Fnv1a_32, b"a", 0xe40c_292c),
            (HashAlgorithm::Fnv1_32, b"a", 0x050c_5d7e),
            (HashAlgorithm::Murmur, b"hello world", 1578702139),
            (HashAlgorithm::Default, b"hello world", 1045060183),
        ];
        for &(algo, key, expected) in cases {
            assert_eq!(algo.digest(key), expected, "{algo:?}({key:?})");
        }
    }

    #[test]
    fn crc_never_zero() {
        assert_eq!(HashAlgorithm::Crc.digest(b""), 1);
    }

    #[test]
    fn empty_input() {
        assert_eq!(HashAlgorithm::Default.digest(b""), 0);
        assert_eq!(HashAlgorithm::Murmur.digest(b""), 0);
        assert_eq!(HashAlgorithm::Fnv1a_32.digest(b""), FNV_32_INIT);
    }

    #[test]
    fn names_round_trip() {
        for algo in HashAlgorithm::ALL {
            assert_eq!(HashAlgorithm::from_name(algo.as_str()), Some(algo));
        }
        assert_eq!(HashAlgorithm::from_name("MD5"), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::from_name("hsieh"), None);
    }
}
