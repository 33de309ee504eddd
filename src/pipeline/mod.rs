//! Pipeline stages for spreadsheet splitting.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ decode ──▶ group ──▶ layout ──▶ raster ──▶ (store)
//! (path/URL) (calamine  (serial   (HTML +    (chrome or
//!             or csv)    key)      sizing)    fallback)
//! ```
//!
//! 1. [`input`]  — read a local file or download a URL into memory
//! 2. [`decode`] — workbook/CSV bytes → [`crate::dataset::Dataset`]
//! 3. [`group`]  — partition rows by the serial column and order the groups
//! 4. [`layout`] — one group → HTML table page with its size rules
//! 5. [`raster`] — page → PDF bytes via [`chrome`] with [`fallback`] behind it
//! 6. [`tabular`] — optional per-group XLSX re-encode
//! 7. [`bundle`] — optional ZIP of every stored document
//!
//! Stages 4–7 are synchronous and run inside `spawn_blocking`.

pub mod bundle;
#[cfg(feature = "chrome")]
pub mod chrome;
pub mod decode;
pub mod fallback;
pub mod group;
pub mod input;
pub mod layout;
pub mod raster;
pub mod tabular;
