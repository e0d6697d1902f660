use {
    anyhow::{Result, bail},
    bytes::Bytes,
    fs_err::OpenOptions,
    std::{
        io::{self, Read, Write},
        path::Path,
    },
    tokio::{sync::mpsc, task::block_in_place},
    tokio_stream::{Stream, wrappers::ReceiverStream},
    tracing::warn,
};

const CONTENT_CHUNK_LEN: usize = 64 * 1024;

pub fn stream_file(mut file: impl Read + Send + 'static) -> impl Stream<Item = Bytes> {
    let (tx, rx) = mpsc::channel(5);
    tokio::spawn(async move {
        let mut buf = vec![0u8; CONTENT_CHUNK_LEN];
        loop {
            match block_in_place(|| file.read(&mut buf)) {
                Ok(len) => {
                    if len == 0 {
                        break; // end of file
                    }
                    let Some(chunk) = buf.get(..len) else {
                        break;
                    };
                    if tx.send(Bytes::copy_from_slice(chunk)).await.is_err() {
                        break; // receiver closed
                    }
                }
                Err(err) => {
                    warn!(?err, "failed to read content file");
                    break;
                }
            }
        }
    });
    ReceiverStream::new(rx)
}

/// Log destination: appends to `log_file` if set, stdout otherwise.
pub fn log_writer(log_file: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    if let Some(log_file) = log_file {
        if log_file.as_os_str().is_empty() {
            bail!("log file path cannot be empty");
        }
        if let Some(dir) = log_file.parent() {
            if !dir.as_os_str().is_empty() {
                fs_err::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        Ok(Box::new(file))
    } else {
        Ok(Box::new(io::stdout()))
    }
}

/// Parses a boolean query parameter the way form frameworks do.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid boolean value: {value:?}"),
    }
}

#[test]
fn bool_values() {
    assert!(parse_bool("true").unwrap());
    assert!(parse_bool("ON").unwrap());
    assert!(parse_bool("1").unwrap());
    assert!(!parse_bool("False").unwrap());
    assert!(!parse_bool("0").unwrap());
    parse_bool("").unwrap_err();
    parse_bool("maybe").unwrap_err();
}
