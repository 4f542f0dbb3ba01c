//! LTR retrotransposon finder.
//!
//! Seeds (maximal exact self-matches from an external enumerator) are
//! extended with an arbitrary-score X-drop wavefront, borders are refined
//! against target-site duplications and palindromic motifs, candidates are
//! filtered by length/distance constraints and LTR similarity, and finally
//! duplicates and overlaps are eliminated.

pub mod candidate;
pub mod dedup;
pub mod repeats;
pub mod search;
pub mod tsdmotif;
pub mod xdrop;

pub use candidate::LtrCandidate;
pub use repeats::{Seed, SeedConstraints};
pub use search::{LtrSearchError, LtrSearchParams, OverlapPolicy, search_for_ltrs};
pub use xdrop::{XdropBest, XdropFronts, XdropScores};
