//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};

use super::layout::PointerWidth;

/// Strongly typed address in a snapshot's address space
///
/// This wrapper around `u64` keeps addresses apart from lengths and counts,
/// which class images are full of. Region lengths stay plain `u64`.
///
/// ## Example
///
/// ```rust
/// use classwalk_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use classwalk_core::types::Address;
    ///
    /// const SEGMENT_BASE: Address = Address::new(0x7f00_0000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use classwalk_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Apply a signed displacement, as used by self-relative pointers
    ///
    /// ```rust
    /// use classwalk_core::types::Address;
    ///
    /// let slot = Address::from(0x1000);
    /// assert_eq!(slot.checked_offset(-0x10), Some(Address::from(0xff0)));
    /// assert_eq!(slot.checked_offset(0x20), Some(Address::from(0x1020)));
    /// assert_eq!(Address::ZERO.checked_offset(-1), None);
    /// ```
    pub fn checked_offset(self, displacement: i64) -> Option<Self>
    {
        self.0.checked_add_signed(displacement).map(Address)
    }

    /// Add an offset to this address, saturating at the maximum value
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance from `base` to this address, or `None` if `base` is above it
    pub fn distance_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Round up to the next multiple of `align` (a power of two)
    pub fn align_up(self, align: u64) -> Self
    {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        Address(self.0.saturating_add(mask) & !mask)
    }

    /// Display adapter that pads to the target's pointer width
    ///
    /// ```rust
    /// use classwalk_core::types::{Address, PointerWidth};
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.display(PointerWidth::Bits32).to_string(), "0x00001000");
    /// assert_eq!(addr.display(PointerWidth::Bits64).to_string(), "0x0000000000001000");
    /// ```
    pub fn display(self, width: PointerWidth) -> PaddedAddress
    {
        PaddedAddress { address: self, width }
    }
}

/// Fixed-width rendering of an [`Address`], see [`Address::display`]
#[derive(Debug, Clone, Copy)]
pub struct PaddedAddress
{
    address: Address,
    width: PointerWidth,
}

impl fmt::Display for PaddedAddress
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let digits = self.width.bytes() * 2;
        write!(f, "0x{:0digits$x}", self.address.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
