use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

///
/// Read every line of the input file into memory
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let buf: Box<dyn BufRead> = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for x in buf.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

///
/// Write every line into the output file
///
/// * `lines` - vector of displayable items, one per line
/// * `output_file` - file name--either gzipped or not
///
pub fn write_types<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

pub fn write_lines(lines: &[Box<str>], output_file: &str) -> anyhow::Result<()> {
    write_types(lines, output_file)
}

///
/// Read lines of whitespace/tab-delimited words, skipping comment
/// lines (`#` or `%`)
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines_of_words(input_file: &str) -> anyhow::Result<Vec<Vec<Box<str>>>> {
    let buf: Box<dyn BufRead> = open_buf_reader(input_file)?;

    let mut out = vec![];
    for line in buf.lines() {
        let line = line?;
        if line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let words: Vec<Box<str>> = line
            .split_whitespace()
            .map(|w| w.to_string().into_boxed_str())
            .collect();
        if !words.is_empty() {
            out.push(words);
        }
    }
    Ok(out)
}

///
/// Open a buffered reader, transparently decompressing `.gz` files
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let path = Path::new(input_file);
    if !path.exists() {
        return Err(anyhow::anyhow!("file not found: {}", input_file));
    }

    let file = File::open(path)?;

    if path.extension() == Some(OsStr::new("gz")) {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

///
/// Open a buffered writer, transparently compressing `.gz` files;
/// parent directories are created as needed
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    mkdir(output_file)?;
    let path = Path::new(output_file);
    let file = File::create(path)?;

    if path.extension() == Some(OsStr::new("gz")) {
        let encoder = GzEncoder::new(file, Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Create the parent directory of `file` if it does not exist yet
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
