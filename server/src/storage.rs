use {
    anyhow::bail,
    chrono::{DateTime, Utc},
    filegate_protocol::{DateTimeUtc, FileId, Visibility, endpoints::FileInfo},
    fs_err::{File, create_dir_all, read_dir, remove_file, rename},
    std::{
        io::{self, Read, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    thiserror::Error,
    tracing::warn,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(FileId),
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("File too large: {size} bytes, maximum is {limit}")]
    FileTooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Location and size of a written object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub object_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTimeUtc,
}

/// Filesystem object store.
///
/// Objects live at `<root>/<public|private>/<file id>`. New content is written
/// to `<root>/tmp` first and renamed into place when complete.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    tmp: PathBuf,
    max_file_size: u64,
}

fn not_found_as(id: &FileId) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |err| {
        if err.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(id.clone())
        } else {
            StorageError::Io(err)
        }
    }
}

impl Storage {
    pub fn new(root: PathBuf, max_file_size: u64) -> anyhow::Result<Self> {
        if !root.try_exists()? {
            bail!("storage root {} doesn't exist", root.display());
        }

        let tmp = root.join("tmp");
        create_dir_all(&tmp)?;
        for visibility in Visibility::ALL {
            create_dir_all(root.join(visibility.folder()))?;
        }

        Ok(Self {
            root,
            tmp,
            max_file_size,
        })
    }

    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn path(&self, id: &FileId, visibility: Visibility) -> PathBuf {
        self.root.join(visibility.folder()).join(id.as_str())
    }

    fn check_size(&self, size: u64) -> Result<(), StorageError> {
        if size > self.max_file_size {
            return Err(StorageError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn exists(&self, id: &FileId, visibility: Visibility) -> Result<bool, StorageError> {
        Ok(self.path(id, visibility).try_exists()?)
    }

    pub fn create_file(&self) -> Result<NamedTempFile, StorageError> {
        Ok(NamedTempFile::new_in(&self.tmp)?)
    }

    /// Moves a file created by [`Storage::create_file`] to its final location.
    /// Never replaces an existing object.
    pub fn commit_file(
        &self,
        mut file: NamedTempFile,
        id: &FileId,
        visibility: Visibility,
    ) -> Result<StoredObject, StorageError> {
        file.flush()?;
        let size = file.as_file().metadata()?.len();
        self.check_size(size)?;
        let object_path = visibility.object_path(id);
        file.persist_noclobber(self.path(id, visibility))
            .map_err(|err| {
                if err.error.kind() == io::ErrorKind::AlreadyExists {
                    StorageError::AlreadyExists(object_path.clone())
                } else {
                    StorageError::Io(err.error)
                }
            })?;
        Ok(StoredObject { object_path, size })
    }

    pub fn put(
        &self,
        data: &[u8],
        id: &FileId,
        visibility: Visibility,
    ) -> Result<StoredObject, StorageError> {
        self.check_size(u64::try_from(data.len()).unwrap_or(u64::MAX))?;
        let mut file = self.create_file()?;
        file.write_all(data)?;
        self.commit_file(file, id, visibility)
    }

    /// Opens an object for streaming. Returns the file and its size.
    pub fn open(&self, id: &FileId, visibility: Visibility) -> Result<(File, u64), StorageError> {
        let file = File::open(self.path(id, visibility)).map_err(not_found_as(id))?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    pub fn get(&self, id: &FileId, visibility: Visibility) -> Result<Vec<u8>, StorageError> {
        let (mut file, size) = self.open(id, visibility)?;
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Lists objects of one folder, or of both if `visibility` is `None`.
    pub fn list(&self, visibility: Option<Visibility>) -> Result<Vec<FileInfo>, StorageError> {
        let visibilities = match visibility {
            Some(visibility) => vec![visibility],
            None => Visibility::ALL.to_vec(),
        };
        let mut files = Vec::new();
        for visibility in visibilities {
            let mut folder = list_folder(&self.root.join(visibility.folder()), visibility)?;
            folder.sort_by(|a, b| a.file_id.cmp(&b.file_id));
            files.append(&mut folder);
        }
        Ok(files)
    }

    pub fn stat(&self, id: &FileId, visibility: Visibility) -> Result<FileStat, StorageError> {
        let metadata = fs_err::metadata(self.path(id, visibility)).map_err(not_found_as(id))?;
        Ok(FileStat {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Renames an object within its folder. Returns the new object path.
    pub fn rename(
        &self,
        old_id: &FileId,
        new_id: &FileId,
        visibility: Visibility,
    ) -> Result<String, StorageError> {
        self.relocate((old_id, visibility), (new_id, visibility))
    }

    /// Moves an object to the other folder.
    pub fn toggle_share(
        &self,
        id: &FileId,
        current: Visibility,
    ) -> Result<(String, Visibility), StorageError> {
        let target = current.toggled();
        let object_path = self.relocate((id, current), (id, target))?;
        Ok((object_path, target))
    }

    fn relocate(
        &self,
        (from_id, from): (&FileId, Visibility),
        (to_id, to): (&FileId, Visibility),
    ) -> Result<String, StorageError> {
        let source = self.path(from_id, from);
        if !source.try_exists()? {
            return Err(StorageError::NotFound(from_id.clone()));
        }
        let target = self.path(to_id, to);
        if target.try_exists()? {
            return Err(StorageError::AlreadyExists(to.object_path(to_id)));
        }
        rename(&source, &target).map_err(not_found_as(from_id))?;
        Ok(to.object_path(to_id))
    }

    /// Returns `false` if there was no such object.
    pub fn delete(&self, id: &FileId, visibility: Visibility) -> Result<bool, StorageError> {
        match remove_file(self.path(id, visibility)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn list_folder(dir: &Path, visibility: Visibility) -> Result<Vec<FileInfo>, StorageError> {
    let mut files = Vec::new();
    for entry in read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(file_id) = name.to_str().and_then(|name| name.parse::<FileId>().ok()) else {
            warn!(?name, "skipping object with unsupported name");
            continue;
        };
        files.push(FileInfo {
            object_path: visibility.object_path(&file_id),
            size: entry.metadata()?.len(),
            is_public: visibility.is_public(),
            file_id,
        });
    }
    Ok(files)
}
