//! Page specifications
//!
//! Clients send `"1,3"`, `"2-5"`, `"-1"` (last page), a bare number, an
//! array of either, or nothing at all. Indices are 1-based; negative indices
//! count back from the last page.

use std::collections::BTreeSet;

use serde_json::Value;

use super::types::ValidationError;

/// One element of a page spec, before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRef {
    Single(i64),
    /// Inclusive range; either end may be negative
    Range(i64, i64),
}

/// Which pages to process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSpec {
    #[default]
    All,
    Pages(Vec<PageRef>),
}

impl PageSpec {
    /// Parse the comma-separated string form
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut refs = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            refs.push(parse_part(part)?);
        }

        if refs.is_empty() {
            Ok(Self::All)
        } else {
            Ok(Self::Pages(refs))
        }
    }

    /// Parse the `pages` tool argument
    pub fn from_value(value: Option<&Value>) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidArgument {
            name: "pages",
            expected: "a page string, a page number or an array of them",
        };

        match value {
            None | Some(Value::Null) => Ok(Self::All),
            Some(Value::String(s)) => Self::parse(s),
            Some(Value::Number(n)) => {
                let page = n.as_i64().ok_or_else(invalid)?;
                Ok(Self::Pages(vec![single(page)?]))
            }
            Some(Value::Array(items)) => {
                let mut refs = Vec::new();
                for item in items {
                    match item {
                        Value::Number(n) => refs.push(single(n.as_i64().ok_or_else(invalid)?)?),
                        Value::String(s) => {
                            if let Self::Pages(more) = Self::parse(s)? {
                                refs.extend(more);
                            }
                        }
                        _ => return Err(invalid()),
                    }
                }
                if refs.is_empty() {
                    Ok(Self::All)
                } else {
                    Ok(Self::Pages(refs))
                }
            }
            Some(_) => Err(invalid()),
        }
    }

    /// Resolve against the document's real page count
    ///
    /// The result is sorted, free of duplicates and every entry lies in
    /// `1..=page_count`. Out-of-range entries are an error, never dropped.
    pub fn resolve(&self, page_count: u32) -> Result<Vec<u32>, ValidationError> {
        let refs = match self {
            Self::All => return Ok((1..=page_count).collect()),
            Self::Pages(refs) => refs,
        };

        let mut pages = BTreeSet::new();
        for page_ref in refs {
            match *page_ref {
                PageRef::Single(n) => {
                    pages.insert(absolute(n, page_count)?);
                }
                PageRef::Range(start, end) => {
                    let (from, to) = (absolute(start, page_count)?, absolute(end, page_count)?);
                    if from > to {
                        return Err(ValidationError::InvalidPageSpec(format!("{}-{}", start, end)));
                    }
                    pages.extend(from..=to);
                }
            }
        }

        Ok(pages.into_iter().collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl std::fmt::Display for PageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Pages(refs) => {
                for (i, page_ref) in refs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match page_ref {
                        PageRef::Single(n) => write!(f, "{}", n)?,
                        PageRef::Range(a, b) => write!(f, "{}-{}", a, b)?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn single(page: i64) -> Result<PageRef, ValidationError> {
    if page == 0 {
        return Err(ValidationError::ZeroPage);
    }
    Ok(PageRef::Single(page))
}

fn parse_part(part: &str) -> Result<PageRef, ValidationError> {
    let invalid = || ValidationError::InvalidPageSpec(part.to_string());

    if let Ok(page) = part.parse::<i64>() {
        return single(page);
    }

    // Range separator is the first '-' that is not a leading sign
    let split = part
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '-')
        .map(|(i, _)| i)
        .ok_or_else(invalid)?;

    let start: i64 = part[..split].trim().parse().map_err(|_| invalid())?;
    let end: i64 = part[split + 1..].trim().parse().map_err(|_| invalid())?;
    if start == 0 || end == 0 {
        return Err(ValidationError::ZeroPage);
    }

    Ok(PageRef::Range(start, end))
}

fn absolute(page: i64, page_count: u32) -> Result<u32, ValidationError> {
    let count = i64::from(page_count);
    let resolved = if page < 0 { count + 1 + page } else { page };

    if resolved < 1 || resolved > count {
        return Err(ValidationError::PageOutOfRange { page, page_count });
    }
    Ok(resolved as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_means_all() {
        assert_eq!(PageSpec::parse("").unwrap(), PageSpec::All);
        assert_eq!(PageSpec::parse(" , ").unwrap(), PageSpec::All);
        assert_eq!(PageSpec::All.resolve(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_singles_negatives_and_ranges() {
        let spec = PageSpec::parse("3, 1,-1, 2-4").unwrap();
        assert_eq!(spec.resolve(5).unwrap(), vec![1, 2, 3, 4, 5]);

        let spec = PageSpec::parse("2--1").unwrap();
        assert_eq!(spec, PageSpec::Pages(vec![PageRef::Range(2, -1)]));
        assert_eq!(spec.resolve(4).unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let spec = PageSpec::parse("1,1,-5").unwrap();
        assert_eq!(spec.resolve(5).unwrap(), vec![1]);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let spec = PageSpec::parse("10").unwrap();
        assert_eq!(
            spec.resolve(5),
            Err(ValidationError::PageOutOfRange {
                page: 10,
                page_count: 5
            })
        );

        let spec = PageSpec::parse("-6").unwrap();
        assert!(matches!(
            spec.resolve(5),
            Err(ValidationError::PageOutOfRange { page: -6, .. })
        ));

        let spec = PageSpec::parse("4-9").unwrap();
        assert!(spec.resolve(5).is_err());
    }

    #[test]
    fn test_zero_and_garbage_rejected() {
        assert_eq!(PageSpec::parse("0"), Err(ValidationError::ZeroPage));
        assert_eq!(PageSpec::parse("0-2"), Err(ValidationError::ZeroPage));
        assert!(matches!(
            PageSpec::parse("one"),
            Err(ValidationError::InvalidPageSpec(_))
        ));
        assert!(matches!(
            PageSpec::parse("1-"),
            Err(ValidationError::InvalidPageSpec(_))
        ));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let spec = PageSpec::parse("4-2").unwrap();
        assert!(matches!(
            spec.resolve(5),
            Err(ValidationError::InvalidPageSpec(_))
        ));
    }

    #[test]
    fn test_from_json_values() {
        assert_eq!(PageSpec::from_value(None).unwrap(), PageSpec::All);
        assert_eq!(PageSpec::from_value(Some(&json!(null))).unwrap(), PageSpec::All);
        assert_eq!(
            PageSpec::from_value(Some(&json!(2))).unwrap(),
            PageSpec::Pages(vec![PageRef::Single(2)])
        );
        assert_eq!(
            PageSpec::from_value(Some(&json!([1, "3-4"]))).unwrap().resolve(4).unwrap(),
            vec![1, 3, 4]
        );
        assert!(matches!(
            PageSpec::from_value(Some(&json!({"page": 1}))),
            Err(ValidationError::InvalidArgument { name: "pages", .. })
        ));
        assert!(matches!(
            PageSpec::from_value(Some(&json!(1.5))),
            Err(ValidationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_every_valid_spec_resolves_inside_bounds() {
        for page_count in 1..=12u32 {
            let count = i64::from(page_count);
            for a in -count..=count {
                if a == 0 {
                    continue;
                }
                let pages = PageSpec::Pages(vec![PageRef::Single(a)])
                    .resolve(page_count)
                    .unwrap();
                assert_eq!(pages.len(), 1);
                assert!(pages.iter().all(|p| (1..=page_count).contains(p)));
            }
        }
    }

    #[test]
    fn test_display_round_trip() {
        let spec = PageSpec::parse("1,3-5,-1").unwrap();
        assert_eq!(spec.to_string(), "1,3-5,-1");
        assert_eq!(PageSpec::All.to_string(), "all");
    }
}
