use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::inverted::{ContigIndex, IndexMeta, IndexParams, KmerIndex};
use crate::error::{IndexError, Result};

const MAGIC: [u8; 4] = *b"KIDX";
const FORMAT_VERSION: u32 = 1;

/// 索引文件扩展名
pub const ARTIFACT_EXT: &str = "kidx";

/// 文件头单独序列化，先校验再解码主体
#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Serialize)]
struct BodyRef<'a> {
    params: &'a IndexParams,
    source: &'a str,
    meta: &'a IndexMeta,
    contigs: &'a [ContigIndex],
}

#[derive(Deserialize)]
struct Body {
    params: IndexParams,
    source: String,
    meta: IndexMeta,
    contigs: Vec<ContigIndex>,
}

fn encode_err(e: bincode::Error) -> IndexError {
    match *e {
        bincode::ErrorKind::Io(io) => IndexError::Io(io),
        other => IndexError::Io(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
    }
}

fn decode_err(e: bincode::Error) -> IndexError {
    match *e {
        bincode::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            IndexError::CorruptArtifact("truncated artifact".to_string())
        }
        bincode::ErrorKind::Io(io) => IndexError::Io(io),
        other => IndexError::CorruptArtifact(other.to_string()),
    }
}

/// 由参考文件名推导索引文件名：去掉目录，替换扩展名
pub fn artifact_path(reference: impl AsRef<Path>) -> PathBuf {
    let base = reference
        .as_ref()
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("reference"));
    base.with_extension(ARTIFACT_EXT)
}

impl KmerIndex {
    pub fn save_to_writer<W: Write>(&self, mut w: W) -> Result<()> {
        self.ensure_built()?;
        let header = Header { magic: MAGIC, version: FORMAT_VERSION };
        bincode::serialize_into(&mut w, &header).map_err(encode_err)?;
        let body = BodyRef {
            params: self.params(),
            source: self.source_descriptor(),
            meta: self.meta(),
            contigs: self.contigs(),
        };
        bincode::serialize_into(&mut w, &body).map_err(encode_err)?;
        w.flush()?;
        Ok(())
    }

    /// 先写入同目录下的临时文件再重命名，失败时不会留下半截索引
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let res = (|| -> Result<()> {
            let f = std::fs::File::create(&tmp)?;
            let mut w = std::io::BufWriter::new(f);
            self.save_to_writer(&mut w)?;
            let f = w.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
            f.sync_all()?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        })();
        if res.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        res
    }

    pub fn load_from_reader<R: Read>(mut r: R) -> Result<Self> {
        let header: Header = bincode::deserialize_from(&mut r).map_err(decode_err)?;
        if header.magic != MAGIC {
            return Err(IndexError::CorruptArtifact("not a k-mer index (bad magic)".to_string()));
        }
        if header.version != FORMAT_VERSION {
            return Err(IndexError::CorruptArtifact(format!(
                "unsupported format version {} (expected {})",
                header.version, FORMAT_VERSION
            )));
        }
        let body: Body = bincode::deserialize_from(&mut r).map_err(decode_err)?;
        validate(&body)?;
        KmerIndex::from_parts(body.params, body.source, body.meta, body.contigs)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())?;
        Self::load_from_reader(std::io::BufReader::new(f))
    }
}

fn validate(body: &Body) -> Result<()> {
    body.params
        .validate()
        .map_err(|e| IndexError::CorruptArtifact(format!("inconsistent parameters: {}", e)))?;
    let key_len = body.params.key_len();
    let mut seen = HashSet::new();
    for c in &body.contigs {
        if !seen.insert(c.name.as_str()) {
            return Err(IndexError::CorruptArtifact(format!("duplicate contig '{}'", c.name)));
        }
        c.check(key_len).map_err(IndexError::CorruptArtifact)?;
    }
    Ok(())
}
