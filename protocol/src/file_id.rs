use {
    anyhow::{Result, bail},
    serde::{Deserialize, Serialize, de::Error},
    std::{fmt, str::FromStr},
};

/// Name of a stored object inside its visibility folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(String);

impl FileId {
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn check_file_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("file id cannot be empty");
    }
    if id == "." || id == ".." {
        bail!("file id cannot be {id:?}");
    }
    if let Some(c) = id.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        bail!("file id cannot contain {c:?}");
    }
    Ok(())
}

impl FromStr for FileId {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        check_file_id(s)?;
        Ok(Self(s.into()))
    }
}

impl<'de> Deserialize<'de> for FileId {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string = <String>::deserialize(deserializer)?;
        string.parse().map_err(D::Error::custom)
    }
}

impl fmt::Display for FileId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access partition of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub const ALL: [Self; 2] = [Self::Private, Self::Public];

    #[must_use]
    #[inline]
    pub fn from_is_public(is_public: bool) -> Self {
        if is_public { Self::Public } else { Self::Private }
    }

    #[must_use]
    #[inline]
    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    /// Top-level folder of the object store holding objects of this visibility.
    #[must_use]
    #[inline]
    pub fn folder(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    #[must_use]
    #[inline]
    pub fn toggled(self) -> Self {
        match self {
            Self::Private => Self::Public,
            Self::Public => Self::Private,
        }
    }

    #[must_use]
    #[inline]
    pub fn object_path(self, id: &FileId) -> String {
        format!("{}/{}", self.folder(), id)
    }
}

#[test]
fn file_id_validation() {
    assert_eq!("a.txt".parse::<FileId>().unwrap().as_str(), "a.txt");
    assert_eq!(
        "report 2024 (final).pdf".parse::<FileId>().unwrap().to_string(),
        "report 2024 (final).pdf"
    );
    "".parse::<FileId>().unwrap_err();
    ".".parse::<FileId>().unwrap_err();
    "..".parse::<FileId>().unwrap_err();
    "a/b".parse::<FileId>().unwrap_err();
    "a\\b".parse::<FileId>().unwrap_err();
    "a\0b".parse::<FileId>().unwrap_err();

    serde_json::from_str::<FileId>("\"../etc/passwd\"").unwrap_err();
    assert_eq!(
        serde_json::from_str::<FileId>("\"x.bin\"").unwrap(),
        "x.bin".parse::<FileId>().unwrap()
    );
}

#[test]
fn visibility_paths() {
    let id: FileId = "a.txt".parse().unwrap();
    assert_eq!(Visibility::Private.object_path(&id), "private/a.txt");
    assert_eq!(Visibility::Public.object_path(&id), "public/a.txt");
    assert_eq!(Visibility::from_is_public(true), Visibility::Public);
    assert_eq!(Visibility::Public.toggled(), Visibility::Private);
    assert!(!Visibility::default().is_public());
}
