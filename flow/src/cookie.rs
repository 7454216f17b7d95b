// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow identity.
//!
//! Every switch rule installed on behalf of a data flow carries a 64-bit cookie.  The high bits
//! of the cookie hold a fixed tag identifying rules owned by this controller; the low bits hold
//! the [`FlowId`] of the data flow the rule belongs to.  The table-miss rule uses a reserved
//! sentinel instead of a [`FlowId`].

use std::fmt::Display;
use std::num::NonZero;

/// Errors which can occur when converting a `u64` to a [`FlowId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFlowId {
    #[error("Zero is not a legal flow id")]
    Zero,
    #[error("{0:#x} is too large to be a legal flow id ({max:#x} is max legal value)", max = FlowId::MAX.get())]
    TooLarge(u64),
}

/// Identifier of a data flow, unique within a tenant.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(NonZero<u64>);

impl FlowId {
    /// The smallest legal [`FlowId`] (1).
    pub const MIN: FlowId = FlowId(NonZero::<u64>::MIN);

    /// The largest legal [`FlowId`]: every bit below the cookie tag.
    #[allow(unsafe_code)] // safe due to const eval
    pub const MAX: FlowId = FlowId(unsafe { NonZero::new_unchecked(!FlowCookie::TAG_MASK) });

    /// Create a new [`FlowId`].
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is zero or does not fit below the cookie tag.
    pub fn new(id: u64) -> Result<Self, InvalidFlowId> {
        match NonZero::new(id) {
            None => Err(InvalidFlowId::Zero),
            Some(val) if val.get() > Self::MAX.get() => Err(InvalidFlowId::TooLarge(id)),
            Some(val) => Ok(FlowId(val)),
        }
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for FlowId {
    type Error = InvalidFlowId;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        FlowId::new(id)
    }
}

impl From<FlowId> for u64 {
    fn from(id: FlowId) -> u64 {
        id.get()
    }
}

impl Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A 64-bit flow cookie as carried by a switch rule.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(any(feature = "bolero", test), derive(bolero::TypeGenerator))]
pub struct FlowCookie(pub u64);

impl FlowCookie {
    /// Tag bits shared by every rule this controller installs.
    pub const TAG: u64 = 0x7f56_0000_0000_0000;
    /// Mask selecting the tag bits.
    pub const TAG_MASK: u64 = 0xffff_0000_0000_0000;
    /// Mask selecting every bit; used to address one exact cookie.
    pub const EXACT_MASK: u64 = u64::MAX;
    /// Cookie reserved for the table-miss rule.  Its low bits are zero, which is not a legal
    /// [`FlowId`].
    pub const TABLE_MISS: FlowCookie = FlowCookie(Self::TAG);

    /// Build the cookie of a data flow.
    #[must_use]
    pub fn encode(id: FlowId) -> FlowCookie {
        FlowCookie(Self::TAG | id.get())
    }

    /// Recover the [`FlowId`] carried by this cookie.
    ///
    /// Returns `None` for a cookie whose tag bits do not match exactly, and for the table-miss
    /// sentinel.  Foreign rules may legitimately share a flow table with ours, so this is not
    /// treated as an error.
    #[must_use]
    pub fn decode(self) -> Option<FlowId> {
        if !self.is_vtn() {
            return None;
        }
        FlowId::new(self.0 & !Self::TAG_MASK).ok()
    }

    /// Tell if the cookie carries our tag, regardless of its low bits.
    #[must_use]
    pub fn is_vtn(self) -> bool {
        self.0 & Self::TAG_MASK == Self::TAG
    }

    #[must_use]
    pub fn is_table_miss(self) -> bool {
        self == Self::TABLE_MISS
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<FlowId> for FlowCookie {
    fn from(id: FlowId) -> Self {
        FlowCookie::encode(id)
    }
}

impl Display for FlowCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flow_id_bounds() {
        assert_eq!(FlowId::MIN.get(), 1);
        assert_eq!(FlowId::MAX.get(), 0x0000_ffff_ffff_ffff);
        assert_eq!(FlowId::new(0), Err(InvalidFlowId::Zero));
        assert_eq!(
            FlowId::new(0x0001_0000_0000_0000),
            Err(InvalidFlowId::TooLarge(0x0001_0000_0000_0000))
        );
    }

    #[test]
    fn cookie_round_trip_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|raw: u64| {
                let span = FlowId::MAX.get() - FlowId::MIN.get() + 1;
                let id = FlowId::new(FlowId::MIN.get() + raw % span).unwrap();
                let cookie = FlowCookie::encode(id);
                assert!(cookie.is_vtn());
                assert!(!cookie.is_table_miss());
                assert_eq!(cookie.decode(), Some(id));
            });
    }

    #[test]
    fn foreign_cookie_has_no_identity() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|cookie: FlowCookie| {
                if cookie.0 & FlowCookie::TAG_MASK != FlowCookie::TAG {
                    assert_eq!(cookie.decode(), None);
                } else {
                    let low = cookie.0 & !FlowCookie::TAG_MASK;
                    assert_eq!(cookie.decode().map(FlowId::get), (low != 0).then_some(low));
                }
            });
    }

    #[test]
    fn table_miss_cookie() {
        assert!(FlowCookie::TABLE_MISS.is_vtn());
        assert!(FlowCookie::TABLE_MISS.is_table_miss());
        assert_eq!(FlowCookie::TABLE_MISS.decode(), None);
        assert_eq!(FlowCookie(0x7f57_0000_0000_0007).decode(), None);
        assert_eq!(FlowCookie(7).decode(), None);
        assert_eq!(
            FlowCookie(0x7f56_0000_0000_0007).decode(),
            Some(FlowId::new(7).unwrap())
        );
    }
}
