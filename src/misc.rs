use std::io::{self, BufWriter, Write};
use std::path::Path;
use fs_err::File;
use serde_json::Value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writes `json` as a single comment line
pub fn write_json<W: Write>(mut writer: W, json: &Value) -> io::Result<()>
{
    write!(writer, "#")?;
    serde_json::to_writer(&mut writer, json)?;
    writeln!(writer)
}

pub fn create_buf<P>(path: P) -> io::Result<BufWriter<File>>
where P: Into<std::path::PathBuf>
{
    let file = File::create(path)?;
    Ok(BufWriter::new(file))
}

pub fn write_commands<W: Write>(mut w: W) -> io::Result<()>
{
    write!(w, "#")?;
    for arg in std::env::args()
    {
        write!(w, " {arg}")?;
    }
    writeln!(w)
}

pub fn write_commands_and_version<W: Write>(mut w: W) -> io::Result<()>
{
    writeln!(w, "# {VERSION}")?;
    writeln!(w, "# Git Hash: {} Compile-time: {}", env!("GIT_HASH"), env!("BUILD_TIME_CHRONO"))?;
    write_commands(w)
}

/// Creates the file and starts it with version, build and command line comments
pub fn create_buf_with_command_and_version<P>(path: P) -> io::Result<BufWriter<File>>
where P: AsRef<Path>
{
    let mut buf = create_buf(path.as_ref())?;
    write_commands_and_version(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_becomes_one_comment_line()
    {
        let mut out = Vec::new();
        write_json(&mut out, &json!({"producers": 2})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "#{\"producers\":2}\n");
    }

    #[test]
    fn header_starts_with_version()
    {
        let mut out = Vec::new();
        write_commands_and_version(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(format!("# {VERSION}").as_str()));
        assert!(lines.next().unwrap().starts_with("# Git Hash: "));
        assert!(lines.next().unwrap().starts_with('#'));
    }
}
