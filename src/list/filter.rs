//! Closed filter and sort model for task collections.
//!
//! Filters are built from a fixed set of fields and two comparison shapes
//! (equality and range). A [`Filter`] always holds its predicates validated,
//! sorted and deduplicated, so two filters that mean the same thing compare
//! equal and serialize to the same canonical text.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded::byte_serialize;

use super::error::FetchError;

/// Largest page size the backend accepts
pub const MAX_PAGE_SIZE: u32 = 100;

const STATUSES: &[&str] = &["todo", "in_progress", "done"];
const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];

/// Check a page size before it reaches a key.
pub fn validate_page_size(page_size: u32) -> Result<u32, FetchError> {
  if page_size == 0 || page_size > MAX_PAGE_SIZE {
    return Err(FetchError::validation(format!(
      "page size must be between 1 and {}, got {}",
      MAX_PAGE_SIZE, page_size
    )));
  }
  Ok(page_size)
}

// ============================================================================
// Fields
// ============================================================================

/// Task field that can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterField {
  Status,
  Assignee,
  Category,
  Priority,
  DueDate,
  Points,
}

impl FilterField {
  /// Wire name, also used as the query parameter stem
  pub fn name(&self) -> &'static str {
    match self {
      FilterField::Status => "status",
      FilterField::Assignee => "assignee",
      FilterField::Category => "category",
      FilterField::Priority => "priority",
      FilterField::DueDate => "dueDate",
      FilterField::Points => "points",
    }
  }

  /// Whether range predicates make sense for this field
  pub fn is_ordered(&self) -> bool {
    matches!(
      self,
      FilterField::Priority | FilterField::DueDate | FilterField::Points
    )
  }

  pub fn all_variants() -> &'static [Self] {
    &[
      FilterField::Status,
      FilterField::Assignee,
      FilterField::Category,
      FilterField::Priority,
      FilterField::DueDate,
      FilterField::Points,
    ]
  }

  /// Validate a single value and return its normalized form.
  pub fn normalize(&self, value: &str) -> Result<String, FetchError> {
    let value = value.trim();
    if value.is_empty() {
      return Err(FetchError::validation(format!(
        "{} needs a value",
        self.name()
      )));
    }

    match self {
      FilterField::Status => one_of(self, value, STATUSES),
      FilterField::Priority => one_of(self, value, PRIORITIES),
      FilterField::DueDate => NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| {
          FetchError::validation(format!("dueDate expects YYYY-MM-DD, got '{}'", value))
        }),
      FilterField::Points => value
        .parse::<u32>()
        .map(|p| p.to_string())
        .map_err(|_| {
          FetchError::validation(format!(
            "points expects a non-negative integer, got '{}'",
            value
          ))
        }),
      FilterField::Assignee | FilterField::Category => Ok(value.to_string()),
    }
  }

  /// Compare two normalized values of an ordered field.
  fn compare(&self, a: &str, b: &str) -> Ordering {
    match self {
      FilterField::Points => {
        let a: u32 = a.parse().unwrap_or(0);
        let b: u32 = b.parse().unwrap_or(0);
        a.cmp(&b)
      }
      FilterField::Priority => rank(a, PRIORITIES).cmp(&rank(b, PRIORITIES)),
      // ISO dates order lexically
      _ => a.cmp(b),
    }
  }
}

fn one_of(field: &FilterField, value: &str, allowed: &[&str]) -> Result<String, FetchError> {
  let lower = value.to_lowercase();
  if allowed.contains(&lower.as_str()) {
    Ok(lower)
  } else {
    Err(FetchError::validation(format!(
      "{} must be one of {}, got '{}'",
      field.name(),
      allowed.join("|"),
      value
    )))
  }
}

fn rank(value: &str, ordered: &[&str]) -> usize {
  ordered.iter().position(|v| *v == value).unwrap_or(0)
}

impl FromStr for FilterField {
  type Err = FetchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized: String = s
      .trim()
      .chars()
      .filter(|c| *c != '_' && *c != '-')
      .collect::<String>()
      .to_lowercase();

    match normalized.as_str() {
      "status" => Ok(FilterField::Status),
      "assignee" => Ok(FilterField::Assignee),
      "category" => Ok(FilterField::Category),
      "priority" => Ok(FilterField::Priority),
      "due" | "duedate" => Ok(FilterField::DueDate),
      "points" => Ok(FilterField::Points),
      _ => Err(FetchError::validation(format!(
        "unknown filter field '{}'",
        s.trim()
      ))),
    }
  }
}

// ============================================================================
// Predicates
// ============================================================================

/// One comparison against a task field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Predicate {
  Equals {
    field: FilterField,
    value: String,
  },
  Range {
    field: FilterField,
    min: Option<String>,
    max: Option<String>,
  },
}

impl Predicate {
  pub fn equals(field: FilterField, value: &str) -> Result<Self, FetchError> {
    Ok(Predicate::Equals {
      field,
      value: field.normalize(value)?,
    })
  }

  pub fn range(field: FilterField, min: Option<&str>, max: Option<&str>) -> Result<Self, FetchError> {
    if !field.is_ordered() {
      return Err(FetchError::validation(format!(
        "{} does not support ranges",
        field.name()
      )));
    }

    let min = min.map(|v| field.normalize(v)).transpose()?;
    let max = max.map(|v| field.normalize(v)).transpose()?;

    match (&min, &max) {
      (None, None) => {
        return Err(FetchError::validation(format!(
          "{} range needs at least one bound",
          field.name()
        )))
      }
      (Some(lo), Some(hi)) if field.compare(lo, hi) == Ordering::Greater => {
        return Err(FetchError::validation(format!(
          "{} range is empty: {} > {}",
          field.name(),
          lo,
          hi
        )))
      }
      _ => {}
    }

    Ok(Predicate::Range { field, min, max })
  }

  pub fn field(&self) -> FilterField {
    match self {
      Predicate::Equals { field, .. } | Predicate::Range { field, .. } => *field,
    }
  }

  /// Query parameters this predicate contributes to a collection request.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    match self {
      Predicate::Equals { field, value } => vec![(field.name().to_string(), value.clone())],
      Predicate::Range { field, min, max } => {
        let mut pairs = Vec::new();
        if let Some(min) = min {
          pairs.push((format!("{}From", field.name()), min.clone()));
        }
        if let Some(max) = max {
          pairs.push((format!("{}To", field.name()), max.clone()));
        }
        pairs
      }
    }
  }
}

/// Parses `field=value`, `field=min..max`, `field=min..` and `field=..max`.
impl FromStr for Predicate {
  type Err = FetchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (field, value) = s
      .split_once('=')
      .ok_or_else(|| FetchError::validation(format!("expected field=value, got '{}'", s)))?;
    let field: FilterField = field.parse()?;

    // Free-text fields take ".." literally
    let range = Some(field)
      .filter(FilterField::is_ordered)
      .and_then(|_| value.split_once(".."));

    match range {
      Some((lo, hi)) => {
        let lo = Some(lo.trim()).filter(|v| !v.is_empty());
        let hi = Some(hi.trim()).filter(|v| !v.is_empty());
        Predicate::range(field, lo, hi)
      }
      None => Predicate::equals(field, value),
    }
  }
}

impl Predicate {
  /// Text form with values percent-encoded, so free-text values cannot
  /// imitate separators.
  fn canonical(&self) -> String {
    let encode = |v: &str| byte_serialize(v.as_bytes()).collect::<String>();
    match self {
      Predicate::Equals { field, value } => format!("{}={}", field.name(), encode(value)),
      Predicate::Range { field, min, max } => format!(
        "{}={}..{}",
        field.name(),
        min.as_deref().map(encode).unwrap_or_default(),
        max.as_deref().map(encode).unwrap_or_default()
      ),
    }
  }
}

impl fmt::Display for Predicate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Predicate::Equals { field, value } => write!(f, "{}={}", field.name(), value),
      Predicate::Range { field, min, max } => write!(
        f,
        "{}={}..{}",
        field.name(),
        min.as_deref().unwrap_or(""),
        max.as_deref().unwrap_or("")
      ),
    }
  }
}

// ============================================================================
// Filter
// ============================================================================

/// A validated, canonically ordered set of predicates (all must match).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
  predicates: Vec<Predicate>,
}

impl Filter {
  pub fn new(predicates: impl IntoIterator<Item = Predicate>) -> Result<Self, FetchError> {
    let mut predicates: Vec<Predicate> = predicates.into_iter().collect();
    // Field order first so predicates on one field end up adjacent
    predicates.sort_by(|a, b| a.field().cmp(&b.field()).then_with(|| a.cmp(b)));
    predicates.dedup();

    for pair in predicates.windows(2) {
      if pair[0].field() == pair[1].field() {
        return Err(FetchError::validation(format!(
          "{} is filtered more than once",
          pair[0].field().name()
        )));
      }
    }

    Ok(Self { predicates })
  }

  /// Parse a list of `field=...` expressions.
  pub fn parse<S: AsRef<str>>(exprs: &[S]) -> Result<Self, FetchError> {
    let predicates = exprs
      .iter()
      .map(|e| e.as_ref().parse::<Predicate>())
      .collect::<Result<Vec<_>, _>>()?;
    Self::new(predicates)
  }

  pub fn is_empty(&self) -> bool {
    self.predicates.is_empty()
  }

  #[cfg(test)]
  pub fn predicates(&self) -> &[Predicate] {
    &self.predicates
  }

  /// Deterministic text form, used in page key serialization.
  ///
  /// Distinct filters never share a canonical form: values are encoded and
  /// only ordered fields, whose values cannot contain "..", take ranges.
  pub fn canonical(&self) -> String {
    self
      .predicates
      .iter()
      .map(Predicate::canonical)
      .collect::<Vec<_>>()
      .join("&")
  }

  pub fn query_pairs(&self) -> Vec<(String, String)> {
    self.predicates.iter().flat_map(|p| p.query_pairs()).collect()
  }
}

impl fmt::Display for Filter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      write!(f, "(none)")
    } else {
      let parts: Vec<String> = self.predicates.iter().map(|p| p.to_string()).collect();
      write!(f, "{}", parts.join(" "))
    }
  }
}

// ============================================================================
// Sort
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortField {
  #[default]
  CreatedAt,
  DueDate,
  Priority,
  Points,
  Title,
}

impl SortField {
  pub fn name(&self) -> &'static str {
    match self {
      SortField::CreatedAt => "createdAt",
      SortField::DueDate => "dueDate",
      SortField::Priority => "priority",
      SortField::Points => "points",
      SortField::Title => "title",
    }
  }
}

impl FromStr for SortField {
  type Err = FetchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized: String = s
      .trim()
      .chars()
      .filter(|c| *c != '_' && *c != '-')
      .collect::<String>()
      .to_lowercase();

    match normalized.as_str() {
      "created" | "createdat" => Ok(SortField::CreatedAt),
      "due" | "duedate" => Ok(SortField::DueDate),
      "priority" => Ok(SortField::Priority),
      "points" => Ok(SortField::Points),
      "title" => Ok(SortField::Title),
      _ => Err(FetchError::validation(format!(
        "unknown sort field '{}'",
        s.trim()
      ))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
  Asc,
  Desc,
}

impl SortDirection {
  pub fn name(&self) -> &'static str {
    match self {
      SortDirection::Asc => "asc",
      SortDirection::Desc => "desc",
    }
  }
}

/// Sort specification: one field and a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sort {
  pub field: SortField,
  pub direction: SortDirection,
}

impl Default for Sort {
  fn default() -> Self {
    Self {
      field: SortField::CreatedAt,
      direction: SortDirection::Desc,
    }
  }
}

impl Sort {
  pub fn new(field: SortField, direction: SortDirection) -> Self {
    Self { field, direction }
  }

  pub fn canonical(&self) -> String {
    format!("{}:{}", self.field.name(), self.direction.name())
  }

  pub fn query_pairs(&self) -> Vec<(String, String)> {
    vec![
      ("sort".to_string(), self.field.name().to_string()),
      ("order".to_string(), self.direction.name().to_string()),
    ]
  }
}

/// Parses `field`, `field:asc`, `field:desc` and `-field` (descending).
impl FromStr for Sort {
  type Err = FetchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if let Some(field) = s.strip_prefix('-') {
      return Ok(Sort::new(field.parse()?, SortDirection::Desc));
    }

    match s.split_once(':') {
      Some((field, dir)) => {
        let direction = match dir.trim().to_lowercase().as_str() {
          "asc" => SortDirection::Asc,
          "desc" => SortDirection::Desc,
          other => {
            return Err(FetchError::validation(format!(
              "sort direction must be asc or desc, got '{}'",
              other
            )))
          }
        };
        Ok(Sort::new(field.parse()?, direction))
      }
      None => Ok(Sort::new(s.parse()?, SortDirection::Asc)),
    }
  }
}

impl fmt::Display for Sort {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.canonical())
  }
}
