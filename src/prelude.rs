//! # sectweave Prelude
//!
//! Convenient re-exports of the most commonly used types for composing a
//! patch: the image and object models, the declared/resolved symbol
//! tables, the pattern engine and the splice plan types.

pub use crate::coff::{CoffObject, CoffSection};
pub use crate::config::Config;
pub use crate::pe::{align_up, PeImage, SectionFlags, SectionHeader};
pub use crate::resolve::{ResolvedSymbol, ResolvedSymbols, ScoreWeight};
pub use crate::scan::{DeclaredSymbol, DeclaredSymbols, ScopeFrame};
pub use crate::sig::{PatchPair, Signature};
pub use crate::splice::{Layout, PlacementSlot};
pub use crate::{Error, Result};
