//! Boolean entropy decoder.
//!
//! Keeps up to 56 bits of look-ahead in a `u64`, stores `range - 1` so the
//! split computation needs no correction, and renormalizes with a single
//! `leading_zeros`.

use crate::common::types::Prob;

use super::api::DecodeError;

/// BITS can be any multiple of 8 from 8 to 56 (inclusive).
const BITS: i32 = 56;
/// Number of bytes to read at once (BITS / 8)
const BYTES_PER_LOAD: usize = 7;

/// A node of a probability tree in the flattened form the reader walks.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TreeNode {
    pub left: u8,
    pub right: u8,
    pub prob: Prob,
}

impl TreeNode {
    pub(crate) const UNINIT: TreeNode = TreeNode {
        left: 0,
        right: 0,
        prob: 0,
    };

    const fn prepare_branch(t: i8) -> u8 {
        if t > 0 {
            (t as u8) / 2
        } else {
            let value = -t;
            0x80 | (value as u8)
        }
    }

    pub(crate) const fn value_from_branch(t: u8) -> i8 {
        (t & !0x80) as i8
    }
}

/// Flattens a `[i8]` tree and its probabilities into nodes. Evaluated at
/// compile time for the fixed trees.
pub(crate) const fn tree_nodes_from<const N: usize, const M: usize>(
    tree: [i8; N],
    probs: [Prob; M],
) -> [TreeNode; M] {
    if N != 2 * M {
        panic!("invalid tree with probs");
    }
    let mut nodes = [TreeNode::UNINIT; M];
    let mut i = 0;
    while i < M {
        nodes[i].left = TreeNode::prepare_branch(tree[2 * i]);
        nodes[i].right = TreeNode::prepare_branch(tree[2 * i + 1]);
        nodes[i].prob = probs[i];
        i += 1;
    }
    nodes
}

/// Boolean decoder over a borrowed partition.
#[derive(Clone, Debug)]
pub(crate) struct BoolReader<'a> {
    /// Current accumulated value
    value: u64,
    /// Current range minus 1. In [127, 254] interval.
    range: u32,
    /// Number of valid bits left
    bits: i32,
    /// Remaining buffer to read from
    buf: &'a [u8],
    /// True if input is exhausted
    eof: bool,
}

impl<'a> BoolReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut br = Self {
            value: 0,
            range: 255 - 1,
            bits: -8, // to load the very first 8bits
            buf: data,
            eof: false,
        };
        br.load_new_bytes();
        br
    }

    #[cold]
    fn load_final_bytes(&mut self) {
        // Only read 8bits at a time
        if let Some((&byte, rest)) = self.buf.split_first() {
            self.bits += 8;
            self.value = u64::from(byte) | (self.value << 8);
            self.buf = rest;
        } else if !self.eof {
            self.value <<= 8;
            self.bits += 8;
            self.eof = true;
        } else {
            self.bits = 0; // To avoid undefined behaviour with shifts.
        }
    }

    #[inline(always)]
    fn load_new_bytes(&mut self) {
        if self.buf.len() >= BYTES_PER_LOAD {
            let (head, rest) = self.buf.split_at(BYTES_PER_LOAD);
            let bits = head
                .iter()
                .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
            self.value = bits | (self.value << BITS);
            self.bits += BITS;
            self.buf = rest;
        } else {
            self.load_final_bytes();
        }
    }

    /// Reads a bit that is zero with probability `prob / 256`.
    #[inline(always)]
    pub(crate) fn read_bool(&mut self, prob: Prob) -> bool {
        let mut range = self.range;
        if self.bits < 0 {
            self.load_new_bytes();
        }

        let pos = self.bits;
        let split = (range * u32::from(prob)) >> 8;
        let value = (self.value >> pos) as u32;
        let bit = value > split;

        if bit {
            range -= split;
            self.value -= (u64::from(split) + 1) << pos;
        } else {
            range = split + 1;
        }

        let shift = 7 ^ (31 ^ range.leading_zeros() as i32);
        range <<= shift;
        self.bits -= shift;
        self.range = range - 1;

        bit
    }

    #[inline(always)]
    pub(crate) fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Reads `n` bits as an unsigned value, most significant first.
    #[inline]
    pub(crate) fn read_literal(&mut self, n: u8) -> u32 {
        (0..n).fold(0, |v, _| (v << 1) | u32::from(self.read_flag()))
    }

    /// Magnitude then sign.
    #[inline]
    pub(crate) fn read_signed_value(&mut self, n: u8) -> i32 {
        let magnitude = self.read_literal(n) as i32;
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Presence flag, then [`Self::read_signed_value`]; absent values read as 0.
    #[inline]
    pub(crate) fn read_optional_signed_value(&mut self, n: u8) -> i32 {
        if self.read_flag() {
            self.read_signed_value(n)
        } else {
            0
        }
    }

    /// Walks `tree` from its root and returns the leaf value.
    #[inline]
    pub(crate) fn read_with_tree(&mut self, tree: &[TreeNode]) -> i8 {
        self.read_with_tree_from(tree, 0)
    }

    /// Walks `tree` starting at node `start`.
    #[inline]
    pub(crate) fn read_with_tree_from(&mut self, tree: &[TreeNode], start: usize) -> i8 {
        let mut node = tree[start];
        loop {
            let i = if self.read_bool(node.prob) {
                node.right
            } else {
                node.left
            };
            match tree.get(usize::from(i)) {
                Some(next) if i & 0x80 == 0 => node = *next,
                _ => return TreeNode::value_from_branch(i),
            }
        }
    }

    /// True once the reader had to invent bits past the end of its data.
    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// Fails with `what` if the reader ran past the end of its data.
    #[inline]
    pub(crate) fn check<T>(&self, value: T, what: &'static str) -> Result<T, DecodeError> {
        if self.eof {
            Err(DecodeError::MalformedBitstream(what))
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::*;

    #[test]
    fn short_data_reaches_eof() {
        let data = [0x55, 0xAA, 0x55];
        let mut br = BoolReader::new(&data);
        for _ in 0..100 {
            let _ = br.read_flag();
        }
        assert!(br.is_eof());
        assert!(matches!(
            br.check((), "test"),
            Err(DecodeError::MalformedBitstream("test"))
        ));
    }

    #[test]
    fn long_data_does_not_reach_eof() {
        let data = b"hello world and some more text";
        let mut br = BoolReader::new(data);
        for _ in 0..50 {
            let _ = br.read_flag();
        }
        assert!(!br.is_eof());
    }

    #[test]
    fn reads_known_literals() {
        // Produced by the encoder test vector: flag(false), bool(true, 10),
        // bool(false, 250), then literals 1/1, 3/5, 8/64, 8/185.
        let data = [104, 101, 107, 128];
        let mut br = BoolReader::new(&data);
        assert!(!br.read_flag());
        assert!(br.read_bool(10));
        assert!(!br.read_bool(250));
        assert_eq!(br.read_literal(1), 1);
        assert_eq!(br.read_literal(3), 5);
        assert_eq!(br.read_literal(8), 64);
        assert_eq!(br.read_literal(8), 185);
    }

    #[test]
    fn tree_nodes_flatten_ymode_tree() {
        let nodes = tree_nodes_from(KEYFRAME_YMODE_TREE, KEYFRAME_YMODE_PROBS);
        assert_eq!(nodes[0].left, 0x80 | B_PRED as u8);
        assert_eq!(nodes[0].right, 1);
        assert_eq!(nodes[3].right, 0x80 | TM_PRED as u8);

        let data = [233, 64, 0, 0];
        let mut br = BoolReader::new(&data);
        assert_eq!(br.read_with_tree(&nodes), TM_PRED);
    }
}
