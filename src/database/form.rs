use std::{collections::HashMap, str::FromStr};

use crate::error::ServiceError;

/// Query parameters, keeping every value of a repeated key.
#[derive(Debug, Clone, Default)]
pub struct Form {
    inner: HashMap<String, Vec<String>>,
}

impl Form {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner: HashMap<String, Vec<String>> = HashMap::new();
        pairs.into_iter().for_each(|(key, value)| {
            inner.entry(key.into()).or_default().push(value.into());
        });

        Self { inner }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, ServiceError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| ServiceError::validation(key, "Expected a number")),
            None => Ok(None),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ServiceError> {
        match self.get_str(key).map(str::trim) {
            Some("1") | Some("true") | Some("True") => Ok(Some(true)),
            Some("0") | Some("false") | Some("False") => Ok(Some(false)),
            Some(_) => Err(ServiceError::validation(key, "Expected a boolean")),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_keys_keep_every_value() {
        let form = Form::from_pairs([("tags", "breakfast"), ("tags", "lunch"), ("author", "3")]);

        assert_eq!(form.get_all("tags"), &["breakfast", "lunch"]);
        assert_eq!(form.get_str("tags"), Some("breakfast"));
        assert!(form.get_all("missing").is_empty());
    }

    #[test]
    fn numbers_and_bools_are_parsed() {
        let form = Form::from_pairs([("author", " 7"), ("is_favorited", "1"), ("flag", "yes")]);

        assert_eq!(form.get_number::<i32>("author").unwrap(), Some(7));
        assert_eq!(form.get_number::<i32>("page").unwrap(), None);
        assert_eq!(form.get_bool("is_favorited").unwrap(), Some(true));
        assert!(form.get_bool("flag").is_err());
    }

    #[test]
    fn malformed_number_names_the_key() {
        let form = Form::from_pairs([("author", "abc")]);

        match form.get_number::<i32>("author") {
            Err(ServiceError::Validation(errors)) => assert!(errors.contains("author")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
