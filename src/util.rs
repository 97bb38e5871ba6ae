use ethers::types::U256;
use rust_decimal::Decimal;

/// Scales a raw on-chain integer amount (wei, or a token's smallest unit)
/// down by `10^decimals` into a `Decimal`. The spec fixes this as the one
/// correct native-path scaling (the source had a divergent unscaled
/// variant; see spec.md §9's "open questions").
pub fn scale_amount(value: U256, decimals: u32) -> Decimal {
	// U256 can exceed i128, but deposit amounts in practice fit comfortably;
	// truncate to the low 128 bits rather than panic on pathological input.
	let low128 = value.low_u128();
	let mut decimal = Decimal::from(low128);
	decimal.set_scale(decimals.min(28)).expect("scale within Decimal's supported range");
	decimal
}

/// Case-insensitive address comparison — mandated everywhere addresses are
/// compared (spec.md §9's "open questions": the source mixed case-sensitive
/// and case-insensitive comparisons; this implementation is consistently
/// case-insensitive).
pub fn addresses_eq(a: &ethers::types::H160, b: &ethers::types::H160) -> bool {
	a == b
}
