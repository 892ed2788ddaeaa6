//! Fragment metadata: the JSON comment prepended to every fragment.

use serde::Serialize;

/// Package metadata attached to a manpage file during extraction.
#[derive(Debug, Clone, Default)]
pub struct ManpageMeta {
    pub package_name: String,
    pub package_version: String,
    pub source_package: String,
    /// Base filename (e.g. `ls.1.gz`), used as a title fallback.
    pub filename: String,
}

/// Metadata serialized into the `<!--META:{json}-->` header. Empty
/// optional fields are omitted from the JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FragmentMeta {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(rename = "packageURL", skip_serializing_if = "String::is_empty")]
    pub package_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(rename = "sourceURL", skip_serializing_if = "String::is_empty")]
    pub source_url: String,
    #[serde(rename = "bugURL", skip_serializing_if = "String::is_empty")]
    pub bug_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub toc: String,
}

pub(crate) fn build_package_label(meta: &ManpageMeta) -> String {
    if meta.package_name.is_empty() {
        return String::new();
    }
    if meta.package_version.is_empty() {
        return meta.package_name.clone();
    }
    format!("{} ({})", meta.package_name, meta.package_version)
}

pub(crate) fn build_package_url(release: &str, meta: &ManpageMeta) -> String {
    if meta.package_name.is_empty() || release.is_empty() {
        return String::new();
    }
    format!(
        "https://launchpad.net/ubuntu/{}/+package/{}",
        release, meta.package_name
    )
}

pub(crate) fn build_source_label(meta: &ManpageMeta) -> String {
    if meta.source_package.is_empty() || meta.source_package == meta.package_name {
        return String::new();
    }
    meta.source_package.clone()
}

pub(crate) fn build_source_url(release: &str, meta: &ManpageMeta) -> String {
    if meta.source_package.is_empty()
        || meta.source_package == meta.package_name
        || release.is_empty()
    {
        return String::new();
    }
    format!(
        "https://launchpad.net/ubuntu/{}/+source/{}",
        release, meta.source_package
    )
}

pub(crate) fn build_bug_url(release: &str, meta: &ManpageMeta) -> String {
    if meta.source_package.is_empty() || release.is_empty() {
        return String::new();
    }
    format!(
        "https://bugs.launchpad.net/ubuntu/+source/{}/+filebug-advanced",
        meta.source_package
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, version: &str, source: &str) -> ManpageMeta {
        ManpageMeta {
            package_name: name.to_string(),
            package_version: version.to_string(),
            source_package: source.to_string(),
            filename: String::new(),
        }
    }

    #[test]
    fn package_label_includes_version() {
        assert_eq!(build_package_label(&meta("apt", "", "apt")), "apt");
        assert_eq!(build_package_label(&meta("apt", "2.8.3", "apt")), "apt (2.8.3)");
        assert_eq!(build_package_label(&meta("", "", "")), "");
    }

    #[test]
    fn source_fields_omitted_when_equal_to_package() {
        assert_eq!(build_source_label(&meta("apt", "", "apt")), "");
        assert_eq!(build_source_url("noble", &meta("apt", "", "apt")), "");
        assert_eq!(build_source_label(&meta("apt-utils", "", "apt")), "apt");
        assert_eq!(
            build_source_url("noble", &meta("apt-utils", "", "apt")),
            "https://launchpad.net/ubuntu/noble/+source/apt"
        );
    }

    #[test]
    fn bug_url_uses_source_package() {
        assert_eq!(
            build_bug_url("noble", &meta("apt-utils", "", "apt")),
            "https://bugs.launchpad.net/ubuntu/+source/apt/+filebug-advanced"
        );
        assert_eq!(build_bug_url("", &meta("apt", "", "apt")), "");
    }

    #[test]
    fn empty_fields_omitted_from_json() {
        let fragment = FragmentMeta {
            title: "ls".to_string(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&fragment).unwrap(), r#"{"title":"ls"}"#);
    }
}
