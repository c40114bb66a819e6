//! Variant listing and delivery-ceiling classification.
//!
//! [`VariantCatalog::list_variants`] calls the extraction capability exactly
//! once and buckets every returned variant into `available` or `rejected`
//! against the configured [`SizeCeiling`]. Variants of unknown size are
//! treated as available; the post-download size check is the real backstop.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::extract::{ExtractError, MediaExtractor, RawVariant};

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Maximum artifact size eligible for delivery, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SizeCeiling(u64);

impl SizeCeiling {
    /// Creates a ceiling of `bytes`.
    #[must_use]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Creates a ceiling of `mib` mebibytes.
    #[must_use]
    pub const fn from_mib(mib: u64) -> Self {
        Self(mib.saturating_mul(MIB))
    }

    /// Returns the ceiling in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// True when a file of `size_bytes` may be delivered.
    ///
    /// Unknown sizes are admitted.
    #[must_use]
    pub fn admits(self, size_bytes: Option<u64>) -> bool {
        size_bytes.is_none_or(|size| size <= self.0)
    }
}

impl fmt::Display for SizeCeiling {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} MB", self.0 as f64 / MIB as f64)
    }
}

/// One concrete encoding of a source, as offered to the requester.
///
/// `id` only identifies the variant within the [`CatalogResult`] it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Identifier scoped to one catalog response.
    pub id: String,
    /// Container or file extension.
    pub container: String,
    /// Human readable quality note.
    pub descriptive_label: String,
    /// Size in bytes when known.
    pub size_bytes: Option<u64>,
}

impl From<RawVariant> for Variant {
    fn from(raw: RawVariant) -> Self {
        Self {
            id: raw.id,
            container: raw.container,
            descriptive_label: raw.label,
            size_bytes: raw.size_bytes,
        }
    }
}

/// Which side of the ceiling a variant landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// At or under the ceiling, or of unknown size.
    Available,
    /// Known to exceed the ceiling.
    Rejected,
}

/// Classified variants from one extraction call.
///
/// Every variant the extractor returned appears in exactly one of the two
/// sequences, in the extractor's original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResult {
    /// Title of the media, if known.
    pub title: Option<String>,
    /// Ceiling the classification was made against.
    pub ceiling: SizeCeiling,
    /// Variants eligible for delivery.
    pub available: Vec<Variant>,
    /// Variants known to be too large.
    pub rejected: Vec<Variant>,
}

impl CatalogResult {
    /// Classifies raw variants against `ceiling`.
    ///
    /// Ids must be unique within one response; later duplicates are dropped.
    #[must_use]
    pub fn classify(
        title: Option<String>,
        raw: impl IntoIterator<Item = RawVariant>,
        ceiling: SizeCeiling,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut available = Vec::new();
        let mut rejected = Vec::new();

        for variant in raw.into_iter().map(Variant::from) {
            if !seen.insert(variant.id.clone()) {
                warn!(variant_id = %variant.id, "duplicate variant id in extraction response; keeping first");
                continue;
            }
            if ceiling.admits(variant.size_bytes) {
                available.push(variant);
            } else {
                rejected.push(variant);
            }
        }

        Self {
            title,
            ceiling,
            available,
            rejected,
        }
    }

    /// Looks up a variant by id in either bucket.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<(&Variant, Bucket)> {
        self.available
            .iter()
            .find(|v| v.id == id)
            .map(|v| (v, Bucket::Available))
            .or_else(|| {
                self.rejected
                    .iter()
                    .find(|v| v.id == id)
                    .map(|v| (v, Bucket::Rejected))
            })
    }

    /// Total number of variants across both buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.available.len() + self.rejected.len()
    }

    /// True when the catalog holds no variants at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces [`CatalogResult`]s from an extraction capability.
#[derive(Clone)]
pub struct VariantCatalog {
    extractor: Arc<dyn MediaExtractor>,
    ceiling: SizeCeiling,
}

impl fmt::Debug for VariantCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantCatalog")
            .field("extractor", &self.extractor.name())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

impl VariantCatalog {
    /// Creates a catalog backed by `extractor`.
    #[must_use]
    pub fn new(extractor: Arc<dyn MediaExtractor>, ceiling: SizeCeiling) -> Self {
        Self { extractor, ceiling }
    }

    /// Returns the delivery ceiling.
    #[must_use]
    pub fn ceiling(&self) -> SizeCeiling {
        self.ceiling
    }

    /// Lists and classifies the variants behind `locator`.
    ///
    /// The extractor is invoked exactly once; failures are returned as-is and
    /// never retried.
    ///
    /// # Errors
    ///
    /// Returns the extractor's error, or [`ExtractError::NoVariants`] when
    /// the extractor returned an empty listing.
    #[instrument(skip(self), fields(extractor = self.extractor.name()))]
    pub async fn list_variants(&self, locator: &str) -> Result<CatalogResult, ExtractError> {
        if locator.trim().is_empty() {
            return Err(ExtractError::unsupported(locator));
        }

        let info = self.extractor.extract(locator).await?;
        if info.variants.is_empty() {
            return Err(ExtractError::no_variants(locator));
        }

        let result = CatalogResult::classify(info.title, info.variants, self.ceiling);
        debug!(
            available = result.available.len(),
            rejected = result.rejected.len(),
            "variants classified"
        );
        info!(variants = result.len(), ceiling = self.ceiling.bytes(), "catalog ready");
        Ok(result)
    }
}
