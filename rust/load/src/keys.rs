use bytes::Bytes;
use rand::Rng;

use crate::config::ConfigError;

/// Draws keys for synthetic puts.
///
/// With a key space of one every key is the same shared all-zero buffer.  Otherwise an id is drawn
/// uniformly from the key space and written big-endian into a `key_size` buffer: left-padded with
/// zeros when the key is at least eight bytes wide, truncated to its low bytes when it is narrower.
#[derive(Clone, Debug)]
pub struct KeySynthesizer {
    key_size: usize,
    key_space: u64,
    zero: Bytes,
}

impl KeySynthesizer {
    pub fn new(key_size: usize, key_space: u64) -> Result<Self, ConfigError> {
        if key_size == 0 {
            return Err(ConfigError::Invalid("key_size must be at least 1".to_string()));
        }
        if key_space == 0 {
            return Err(ConfigError::Invalid(
                "key_space must be at least 1".to_string(),
            ));
        }
        Ok(KeySynthesizer {
            key_size,
            key_space,
            zero: Bytes::from(vec![0u8; key_size]),
        })
    }

    pub fn next_key(&self) -> Bytes {
        self.next_key_with(&mut rand::thread_rng())
    }

    pub fn next_key_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Bytes {
        if self.key_space <= 1 {
            return self.zero.clone();
        }
        let id = rng.gen_range(0..self.key_space);
        Bytes::from(encode_key(id, self.key_size))
    }
}

/// Lay `id` out big-endian in a buffer of exactly `key_size` bytes.
pub fn encode_key(id: u64, key_size: usize) -> Vec<u8> {
    let id8 = id.to_be_bytes();
    if key_size >= id8.len() {
        let mut key = vec![0u8; key_size];
        key[key_size - id8.len()..].copy_from_slice(&id8);
        key
    } else {
        id8[id8.len() - key_size..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn single_key_space_shares_one_buffer() {
        let keys = KeySynthesizer::new(8, 1).unwrap();
        let a = keys.next_key();
        let b = keys.next_key();
        assert_eq!(&[0u8; 8][..], &a[..]);
        assert_eq!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn wide_keys_are_left_padded() {
        assert_eq!(
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x02],
            encode_key(0x0102, 16)
        );
        assert_eq!(vec![0, 0, 0, 0, 0, 0, 0x01, 0x02], encode_key(0x0102, 8));
    }

    #[test]
    fn narrow_keys_keep_low_bytes() {
        assert_eq!(vec![0x02], encode_key(0x0102, 1));
        assert_eq!(vec![0x00, 0x01, 0x02], encode_key(0x0102, 3));
    }

    #[test]
    fn keys_are_independently_owned() {
        let keys = KeySynthesizer::new(8, 1 << 20).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let a = keys.next_key_with(&mut rng);
        let b = keys.next_key_with(&mut rng);
        assert_ne!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(KeySynthesizer::new(0, 10).is_err());
        assert!(KeySynthesizer::new(8, 0).is_err());
    }

    proptest! {
        #[test]
        fn keys_have_configured_width_and_stay_in_space(
            key_size in 1usize..32,
            key_space in 2u64..100_000,
            seed in any::<u64>(),
        ) {
            let keys = KeySynthesizer::new(key_size, key_space).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..16 {
                let key = keys.next_key_with(&mut rng);
                prop_assert_eq!(key_size, key.len());
                if key_size >= 8 {
                    prop_assert!(key[..key_size - 8].iter().all(|b| *b == 0));
                    let mut id8 = [0u8; 8];
                    id8.copy_from_slice(&key[key_size - 8..]);
                    prop_assert!(u64::from_be_bytes(id8) < key_space);
                }
            }
        }
    }
}
