use svm_common::Address;

/// Bit-field accessors for 32-bit descriptor and register words.
pub struct Bits;

impl Bits {
    /// Returns whether bit `bit` of `word` is set.
    #[inline(always)]
    pub fn flag(word: Address, bit: u32) -> bool {
        (word >> bit) & 1 == 1
    }

    /// Extracts `width` bits of `word` starting at bit `lo`.
    #[inline(always)]
    pub fn field(word: Address, lo: u32, width: u32) -> Address {
        if width >= Address::BITS {
            word >> lo
        } else {
            (word >> lo) & ((1 << width) - 1)
        }
    }

    /// Clears the low `bits` bits of `word`, keeping the aligned base.
    #[inline(always)]
    pub fn align_down(word: Address, bits: u32) -> Address {
        if bits >= Address::BITS {
            0
        } else {
            word & !((1 << bits) - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Bits;

    #[test]
    fn extracts_fields_and_flags() {
        let word = 0b1010_0110;
        assert!(Bits::flag(word, 1));
        assert!(!Bits::flag(word, 0));
        assert_eq!(Bits::field(word, 4, 4), 0b1010);
        assert_eq!(Bits::field(word, 0, 32), word);
        assert_eq!(Bits::align_down(0x1234_5678, 12), 0x1234_5000);
        assert_eq!(Bits::align_down(0x1234_5678, 32), 0);
    }
}
