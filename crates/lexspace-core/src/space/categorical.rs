use crate::embedding::l2_normalize;
use crate::error::{Error, Result};

/// N-hot encoding of a label set over a fixed vocabulary.
///
/// The entity vector has `1.0` for every known label it carries and
/// `negative_filter` for every vocabulary slot it does not. One extra slot
/// collects unknown labels when `uncategorized_as_category` is set;
/// otherwise unknown labels are ignored. The vector is L2-normalised, so
/// the dot product with a normalised query n-hot rewards matches and
/// penalises misses in proportion to `negative_filter`.
#[derive(Debug, Clone)]
pub struct CategoricalSpace {
    name: String,
    field: String,
    vocabulary: Vec<String>,
    negative_filter: f32,
    uncategorized_as_category: bool,
}

impl CategoricalSpace {
    pub fn new<I, S>(
        name: impl Into<String>,
        field: impl Into<String>,
        categories: I,
        negative_filter: f32,
        uncategorized_as_category: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let mut vocabulary: Vec<String> = categories.into_iter().map(Into::into).collect();
        vocabulary.sort();
        vocabulary.dedup();
        if vocabulary.is_empty() {
            return Err(Error::IndexConfig(format!(
                "categorical space '{}' needs at least one category",
                name
            )));
        }
        if !negative_filter.is_finite() || negative_filter > 0.0 {
            return Err(Error::IndexConfig(format!(
                "categorical space '{}': negative_filter must be finite and <= 0, got {}",
                name, negative_filter
            )));
        }
        Ok(Self {
            name,
            field: field.into(),
            vocabulary,
            negative_filter,
            uncategorized_as_category,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn negative_filter(&self) -> f32 {
        self.negative_filter
    }

    /// Vocabulary size plus the uncategorized slot.
    pub fn dims(&self) -> usize {
        self.vocabulary.len() + 1
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.vocabulary
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    pub fn embed<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Vec<f32> {
        let mut v = vec![self.negative_filter; self.dims()];
        let mut unknown = false;
        for label in labels {
            match self.position(label) {
                Some(i) => v[i] = 1.0,
                None => unknown = true,
            }
        }
        if unknown && self.uncategorized_as_category {
            v[self.vocabulary.len()] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }

    /// Normalised n-hot of the requested categories.
    pub fn query_vector(&self, categories: &[String]) -> Result<Vec<f32>> {
        if categories.is_empty() {
            return Err(Error::QueryComposition(format!(
                "categorical space '{}' needs at least one query category",
                self.name
            )));
        }
        let mut v = vec![0.0; self.dims()];
        for category in categories {
            let i = self.position(category).ok_or_else(|| {
                Error::QueryComposition(format!(
                    "category '{}' is not in the vocabulary of space '{}'",
                    category, self.name
                ))
            })?;
            v[i] = 1.0;
        }
        l2_normalize(&mut v);
        Ok(v)
    }
}
