// Преобразование одного блока
//
// State layout follows FIPS-197: byte `r + 4c` is row `r` of column `c`,
// and round key `k` is schedule bytes `16k..16k + 16`.

use super::tables::{gf_mul, xtime, INV_SBOX, SBOX};
use super::{SymmetricKey, BLOCK_SIZE};

/// Направление преобразования
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

type State = [u8; BLOCK_SIZE];

fn add_round_key(state: &mut State, round_key: &[u8]) {
    for (byte, k) in state.iter_mut().zip(round_key) {
        *byte ^= k;
    }
}

fn sub_bytes(state: &mut State, table: &[u8; 256]) {
    for byte in state.iter_mut() {
        *byte = table[*byte as usize];
    }
}

fn shift_rows(state: &mut State) {
    let old = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[r + 4 * c] = old[r + 4 * ((c + r) % 4)];
        }
    }
}

fn inv_shift_rows(state: &mut State) {
    let old = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[r + 4 * ((c + r) % 4)] = old[r + 4 * c];
        }
    }
}

fn mix_columns(state: &mut State) {
    for column in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [column[0], column[1], column[2], column[3]];
        column[0] = xtime(a0) ^ (xtime(a1) ^ a1) ^ a2 ^ a3;
        column[1] = a0 ^ xtime(a1) ^ (xtime(a2) ^ a2) ^ a3;
        column[2] = a0 ^ a1 ^ xtime(a2) ^ (xtime(a3) ^ a3);
        column[3] = (xtime(a0) ^ a0) ^ a1 ^ a2 ^ xtime(a3);
    }
}

fn inv_mix_columns(state: &mut State) {
    for column in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [column[0], column[1], column[2], column[3]];
        column[0] = gf_mul(a0, 14) ^ gf_mul(a1, 11) ^ gf_mul(a2, 13) ^ gf_mul(a3, 9);
        column[1] = gf_mul(a0, 9) ^ gf_mul(a1, 14) ^ gf_mul(a2, 11) ^ gf_mul(a3, 13);
        column[2] = gf_mul(a0, 13) ^ gf_mul(a1, 9) ^ gf_mul(a2, 14) ^ gf_mul(a3, 11);
        column[3] = gf_mul(a0, 11) ^ gf_mul(a1, 13) ^ gf_mul(a2, 9) ^ gf_mul(a3, 14);
    }
}

/// Apply the full round sequence of `key` to one block.
///
/// With `Nr = key.rounds()`, encryption is the FIPS-197 cipher with `Nr`
/// rounds and decryption is its straightforward inverse.
pub fn transform_block(block: &State, key: &SymmetricKey, direction: Direction) -> State {
    let rounds = key.rounds();
    let mut state = *block;

    match direction {
        Direction::Encrypt => {
            add_round_key(&mut state, key.round_key(0));
            for round in 1..rounds {
                sub_bytes(&mut state, &SBOX);
                shift_rows(&mut state);
                mix_columns(&mut state);
                add_round_key(&mut state, key.round_key(round));
            }
            sub_bytes(&mut state, &SBOX);
            shift_rows(&mut state);
            add_round_key(&mut state, key.round_key(rounds));
        }
        Direction::Decrypt => {
            add_round_key(&mut state, key.round_key(rounds));
            for round in (1..rounds).rev() {
                inv_shift_rows(&mut state);
                sub_bytes(&mut state, &INV_SBOX);
                add_round_key(&mut state, key.round_key(round));
                inv_mix_columns(&mut state);
            }
            inv_shift_rows(&mut state);
            sub_bytes(&mut state, &INV_SBOX);
            add_round_key(&mut state, key.round_key(0));
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hex_str: &str) -> State {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_aes128_known_answer() {
        // FIPS-197 Appendix C.1
        let key = SymmetricKey::from_raw(128, &hex::decode("000102030405060708090a0b0c0d0e0f").unwrap())
            .unwrap();
        let plaintext = block("00112233445566778899aabbccddeeff");
        let ciphertext = transform_block(&plaintext, &key, Direction::Encrypt);

        assert_eq!(hex::encode(ciphertext), "69c4e0d86a7b0430d8cdb78070b4c55a");
        assert_eq!(transform_block(&ciphertext, &key, Direction::Decrypt), plaintext);
    }

    #[test]
    fn test_aes256_known_answer() {
        // FIPS-197 Appendix C.3
        let raw = hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
            .unwrap();
        let key = SymmetricKey::from_raw(256, &raw).unwrap();
        let plaintext = block("00112233445566778899aabbccddeeff");
        let ciphertext = transform_block(&plaintext, &key, Direction::Encrypt);

        assert_eq!(hex::encode(ciphertext), "8ea2b7ca516745bfeafc49904b496089");
        assert_eq!(transform_block(&ciphertext, &key, Direction::Decrypt), plaintext);
    }

    #[test]
    fn test_shift_rows_inverse() {
        let mut state: State = core::array::from_fn(|i| i as u8);
        let original = state;
        shift_rows(&mut state);
        assert_ne!(state, original);
        inv_shift_rows(&mut state);
        assert_eq!(state, original);
    }

    #[test]
    fn test_mix_columns_inverse() {
        let mut state = block("db135345f20a225c01010101c6c6c6c6");
        mix_columns(&mut state);
        // FIPS-197 / common test column db 13 53 45 -> 8e 4d a1 bc
        assert_eq!(&state[..4], &[0x8e, 0x4d, 0xa1, 0xbc]);
        assert_eq!(&state[8..], &[0x01, 0x01, 0x01, 0x01, 0xc6, 0xc6, 0xc6, 0xc6]);
        inv_mix_columns(&mut state);
        assert_eq!(state, block("db135345f20a225c01010101c6c6c6c6"));
    }

    #[test]
    fn test_odd_sizes_invert() {
        for bits in [8, 40, 96, 160, 224, 520, 4096] {
            let raw: Vec<u8> = (0..bits / 8).map(|i| (i * 31 + 5) as u8).collect();
            let key = SymmetricKey::from_raw(bits, &raw).unwrap();
            let plaintext = block("00112233445566778899aabbccddeeff");
            let ciphertext = transform_block(&plaintext, &key, Direction::Encrypt);
            assert_ne!(ciphertext, plaintext, "bits = {}", bits);
            assert_eq!(transform_block(&ciphertext, &key, Direction::Decrypt), plaintext);
        }
    }
}
