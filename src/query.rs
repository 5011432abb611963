pub const USER_PARAM: &str = "user";
pub const REPOSITORY_PARAM: &str = "repository";

/// A shareable link. Only the query string is ever rewritten; the base and
/// any `#fragment` pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    href: String,
}

impl Location {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.href
    }

    /// Decoded value of the first `name=` pair, if any.
    pub fn param(&self, name: &str) -> Option<String> {
        let (_, query, _) = split_href(&self.href);
        query?
            .split('&')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key == name).then(|| decode_component(value))
            })
            .next()
    }

    /// Returns a copy with `name` set to `value`, or removed when `value` is
    /// `None`. An existing pair keeps its position.
    pub fn with_param(&self, name: &str, value: Option<&str>) -> Self {
        let (base, query, fragment) = split_href(&self.href);
        let mut pairs: Vec<String> = query
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        let matches = |pair: &String| param_name(pair) == name;

        match value {
            Some(value) => {
                let replacement = format!("{name}={}", encode_component(value));
                match pairs.iter().position(matches) {
                    Some(first) => {
                        pairs[first] = replacement;
                        let mut index = 0;
                        pairs.retain(|pair| {
                            let keep = index <= first || !matches(pair);
                            index += 1;
                            keep
                        });
                    }
                    None => pairs.push(replacement),
                }
            }
            None => pairs.retain(|pair| !matches(pair)),
        }

        let mut href = base.to_string();
        if !pairs.is_empty() {
            href.push('?');
            href.push_str(&pairs.join("&"));
        }
        if let Some(fragment) = fragment {
            href.push('#');
            href.push_str(fragment);
        }
        Self { href }
    }
}

fn param_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(key, _)| key)
}

fn split_href(href: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match href.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (href, None),
    };
    match rest.split_once('?') {
        Some((base, query)) => (base, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

/// Percent-encodes everything outside the URL unreserved set.
pub(crate) fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_component(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => out.push(b' '),
            b'%' if index + 2 < bytes.len() => {
                match (hex_value(bytes[index + 1]), hex_value(bytes[index + 2])) {
                    (Some(high), Some(low)) => {
                        out.push((high << 4) | low);
                        index += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareState {
    pub user: String,
    pub repository: String,
}

/// Keeps `user` and `repository` mirrored into the shareable link.
#[derive(Debug, Clone)]
pub struct QueryStateStore {
    location: Location,
}

impl QueryStateStore {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Both parameters, when both are present and non-blank.
    pub fn read(&self) -> Option<ShareState> {
        let user = self.location.param(USER_PARAM)?;
        let repository = self.location.param(REPOSITORY_PARAM)?;
        if user.trim().is_empty() || repository.trim().is_empty() {
            return None;
        }
        Some(ShareState { user, repository })
    }

    pub fn write(&mut self, user: &str, repository: &str) {
        self.location = self
            .location
            .with_param(USER_PARAM, Some(user))
            .with_param(REPOSITORY_PARAM, Some(repository));
    }

    pub fn clear(&mut self) {
        self.location = self
            .location
            .with_param(USER_PARAM, None)
            .with_param(REPOSITORY_PARAM, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn appends_to_bare_link() {
        let location = Location::new("tonalhub://play").with_param(USER_PARAM, Some("octocat"));
        assert_eq!(location.as_str(), "tonalhub://play?user=octocat");
    }

    #[test]
    fn replaces_in_place_and_keeps_fragment() {
        let location = Location::new("https://host/page?user=a&theme=dark#grid")
            .with_param(USER_PARAM, Some("b"));
        assert_eq!(location.as_str(), "https://host/page?user=b&theme=dark#grid");
    }

    #[test]
    fn removing_last_param_drops_question_mark() {
        let location =
            Location::new("https://host/page?user=a#grid").with_param(USER_PARAM, None);
        assert_eq!(location.as_str(), "https://host/page#grid");
    }

    #[test]
    fn reads_plus_as_space_and_percent_escapes() {
        let location = Location::new("x://y?user=Jane+Doe&repository=caf%C3%A9");
        assert_eq!(location.param(USER_PARAM).as_deref(), Some("Jane Doe"));
        assert_eq!(location.param(REPOSITORY_PARAM).as_deref(), Some("café"));
    }

    #[test]
    fn malformed_escape_is_kept_literally() {
        let location = Location::new("x://y?user=100%");
        assert_eq!(location.param(USER_PARAM).as_deref(), Some("100%"));
    }

    #[test]
    fn store_requires_both_params() {
        let store = QueryStateStore::new(Location::new("x://y?user=octocat"));
        assert_eq!(store.read(), None);
    }

    #[test]
    fn store_write_then_clear_restores_link() {
        let mut store = QueryStateStore::new(Location::new("x://y?theme=dark"));
        store.write("octocat", "hello-world");
        assert_eq!(
            store.read(),
            Some(ShareState {
                user: String::from("octocat"),
                repository: String::from("hello-world"),
            })
        );
        store.clear();
        assert_eq!(store.location().as_str(), "x://y?theme=dark");
    }

    proptest! {
        #[test]
        fn written_values_read_back(user in "\\PC{1,20}", repository in "[a-zA-Z0-9 &=#?%+._-]{1,20}") {
            let mut store = QueryStateStore::new(Location::new("x://y?keep=1#frag"));
            store.write(&user, &repository);
            prop_assert_eq!(store.location().param(USER_PARAM), Some(user.clone()));
            prop_assert_eq!(store.location().param(REPOSITORY_PARAM), Some(repository.clone()));
            let keep = store.location().param("keep");
            prop_assert_eq!(keep.as_deref(), Some("1"));
            prop_assert!(store.location().as_str().ends_with("#frag"));
        }
    }
}
