use std::{collections::HashMap, fmt};

/// Secrets passed by the CO on a request. Only the keys are ever shown
/// by `Debug`.
#[derive(Default)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
  #[inline]
  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<HashMap<String, String>> for Secrets {
  #[inline]
  fn from(v: HashMap<String, String>) -> Self {
    Secrets(v)
  }
}

impl fmt::Debug for Secrets {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut keys = self.0.keys().collect::<Vec<_>>();
    keys.sort();

    let mut m = f.debug_map();
    for k in keys {
      m.key(k).value(&"SECRET");
    }

    m.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn debug_hides_values() {
    let mut map = HashMap::new();
    map.insert("token".to_owned(), "s3cr3t".to_owned());
    let secrets = Secrets::from(map);

    let rendered = format!("{:?}", secrets);
    assert_eq!(rendered, r#"{"token": "SECRET"}"#);
    assert_eq!(secrets.get("token"), Some("s3cr3t"));
  }
}
