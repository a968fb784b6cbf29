//! Boolean entropy encoder, the writing half of the format's range coder.

use alloc::vec::Vec;

#[derive(Debug)]
pub(crate) struct ArithmeticEncoder {
    /// the entropy values that have been encoded so far
    writer: Vec<u8>,
    /// value of the current bytes being encoded
    bottom: u32,
    /// the range for the next bit, must be between 128 and 255 inclusive
    range: u32,
    /// number of bits that have been encoded in the current byte
    bit_num: i32,
}

impl Default for ArithmeticEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithmeticEncoder {
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: Vec::with_capacity(capacity),
            bottom: 0,
            range: 255,
            bit_num: 24,
        }
    }

    /// Bytes emitted so far, not counting the bits still held in `bottom`.
    pub(crate) fn len(&self) -> usize {
        self.writer.len()
    }

    // Carry into the bytes already written; a run of 0xFF turns into zeros.
    fn add_one_to_output(&mut self) {
        for byte in self.writer.iter_mut().rev() {
            if *byte < 255 {
                *byte += 1;
                return;
            }
            *byte = 0;
        }
        self.writer.insert(0, 1);
    }

    pub(crate) fn write_flag(&mut self, flag_bool: bool) {
        self.write_bool(flag_bool, 128);
    }

    pub(crate) fn write_bool(&mut self, bool_to_write: bool, probability: u8) {
        let split = 1 + (((self.range - 1) * u32::from(probability)) >> 8);

        if bool_to_write {
            self.bottom = self.bottom.wrapping_add(split);
            self.range -= split;
        } else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;

            if self.bottom & (1 << 31) != 0 {
                self.add_one_to_output();
            }
            self.bottom <<= 1;

            self.bit_num -= 1;
            if self.bit_num == 0 {
                self.writer.push((self.bottom >> 24) as u8);
                // only keep low 3 bytes
                self.bottom &= (1 << 24) - 1;
                self.bit_num = 8;
            }
        }
    }

    /// Writes the low `num_bits` of `value`, most significant first.
    pub(crate) fn write_literal(&mut self, num_bits: u8, value: u32) {
        for bit in (0..num_bits).rev() {
            self.write_bool((value >> bit) & 1 != 0, 128);
        }
    }

    /// Magnitude then sign, the layout of header deltas.
    pub(crate) fn write_signed_value(&mut self, num_bits: u8, value: i32) {
        self.write_literal(num_bits, value.unsigned_abs());
        self.write_flag(value < 0);
    }

    /// A presence flag followed, if present, by [`Self::write_signed_value`].
    pub(crate) fn write_optional_signed_value(&mut self, num_bits: u8, value: Option<i32>) {
        self.write_flag(value.is_some());
        if let Some(value) = value {
            self.write_signed_value(num_bits, value);
        }
    }

    /// Writes the path to leaf `value` of `tree`.
    pub(crate) fn write_with_tree(&mut self, tree: &[i8], probabilities: &[u8], value: i8) {
        debug_assert_eq!(tree.len(), probabilities.len() * 2);
        let mut path = [(false, 0u8); 16];
        let mut len = 0;
        let found = tree_path(tree, probabilities, value, 0, &mut path, &mut len);
        debug_assert!(found, "{value} is not a leaf of {tree:?}");
        for &(bit, prob) in &path[..len] {
            self.write_bool(bit, prob);
        }
    }

    /// Flushes any remaining bits to the writer and consumes the encoder altogether
    pub(crate) fn flush_and_get_buffer(mut self) -> Vec<u8> {
        let mut c = self.bit_num;
        let mut v = self.bottom;
        if self.bottom & (1 << (32 - self.bit_num)) != 0 {
            self.add_one_to_output();
        }
        v <<= c & 0b111;
        c = (c >> 3) - 1;
        while c >= 0 {
            v <<= 8;
            c -= 1;
        }
        for _ in 0..4 {
            self.writer.push((v >> 24) as u8);
            v <<= 8;
        }
        self.writer
    }
}

// Depth-first search for `value`, recording (bit, probability) along the way.
fn tree_path(
    tree: &[i8],
    probabilities: &[u8],
    value: i8,
    node: usize,
    path: &mut [(bool, u8); 16],
    len: &mut usize,
) -> bool {
    for (branch, bit) in [(tree[node], false), (tree[node + 1], true)] {
        path[*len] = (bit, probabilities[node / 2]);
        *len += 1;
        let found = if branch <= 0 {
            -branch == value
        } else {
            tree_path(tree, probabilities, value, branch as usize, path, len)
        };
        if found {
            return true;
        }
        *len -= 1;
    }
    false
}
