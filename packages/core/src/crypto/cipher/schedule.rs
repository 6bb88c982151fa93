// Расширение ключа
//
// Rijndael key schedule generalized to any whole number of key bytes.

use super::tables::{xtime, SBOX};
use super::{key_words, rounds_for};
use zeroize::Zeroizing;

fn sub_word(word: &mut [u8; 4]) {
    for byte in word.iter_mut() {
        *byte = SBOX[*byte as usize];
    }
}

/// Expand `raw` into `4 * (Nr + 1)` round-key words, returned as bytes.
///
/// The first `Nk` words are the key itself (zero-padded to a word boundary);
/// the rest follow `w[i] = w[i - Nk] ^ f(w[i - 1])`.
pub(crate) fn expand(raw: &[u8]) -> Vec<u8> {
    let bits = raw.len() * 8;
    let nk = key_words(bits);
    let total = 4 * (rounds_for(bits) + 1);
    debug_assert!(total >= nk);

    let mut words: Zeroizing<Vec<[u8; 4]>> = Zeroizing::new(Vec::with_capacity(total));
    for chunk in raw.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        words.push(word);
    }

    let mut rcon = 0x01u8;
    for i in nk..total {
        let mut temp = words[i - 1];
        if i % nk == 0 {
            temp.rotate_left(1);
            sub_word(&mut temp);
            temp[0] ^= rcon;
            rcon = xtime(rcon);
        } else if nk > 6 && i % nk == 4 {
            sub_word(&mut temp);
        }
        let prev = words[i - nk];
        words.push([
            prev[0] ^ temp[0],
            prev[1] ^ temp[1],
            prev[2] ^ temp[2],
            prev[3] ^ temp[3],
        ]);
    }

    words.iter().flat_map(|word| word.iter().copied()).collect()
}
