//! Shannon entropy over a buffer or a file stream (spec §4.A).

use crate::error::Result;
use std::fs::File;
use std::io::Read;

/// `-Σ p·log2(p)` over byte frequencies, natural (log2) unit.
pub fn entropy_of_bytes(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let total = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Streams a file through the same byte-frequency count without holding the
/// whole thing in memory.
pub fn entropy_of_file(file: &mut File) -> Result<f64> {
    let mut counts = [0u64; 256];
    let mut total: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            counts[b as usize] += 1;
        }
        total += n as u64;
    }
    if total == 0 {
        return Ok(0.0);
    }
    let total = total as f64;
    Ok(counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(entropy_of_bytes(b""), 0.0);
    }

    #[test]
    fn single_byte_repeated_is_zero() {
        assert_eq!(entropy_of_bytes(&[7u8; 1024]), 0.0);
    }

    #[test]
    fn two_symbols_even_split_is_one() {
        let data: Vec<u8> = (0..1000u32).map(|i| if i % 2 == 0 { 0 } else { 1 }).collect();
        assert!((entropy_of_bytes(&data) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hello_matches_expected() {
        // Scenario A: entropy of "hello\n" approx 2.2516.
        let e = entropy_of_bytes(b"hello\n");
        assert!((e - 2.2516).abs() < 1e-3, "got {e}");
    }
}
