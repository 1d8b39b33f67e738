pub mod generate;
pub mod layout;

pub use generate::{save_patterns, PatternSaveSummary};
pub use layout::{PatternLayout, PatternSet};

/// Entry (i, j) of the Sylvester Hadamard matrix of any power-of-two order:
/// `(-1)^popcount(i & j)`.
#[inline]
pub fn sylvester_entry(i: usize, j: usize) -> i8 {
    if (i & j).count_ones() % 2 == 0 {
        1
    } else {
        -1
    }
}

pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && n & (n - 1) == 0
}
