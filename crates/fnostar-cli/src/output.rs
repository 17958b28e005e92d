use std::io::{self, Write};

use serde::Serialize;

use crate::error::CliError;

/// Print a command result as one JSON document on stdout.
pub fn render<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<(), CliError> {
    write_json(&mut io::stdout().lock(), value, pretty)
}

pub fn write_json<W, T>(writer: &mut W, value: &T, pretty: bool) -> Result<(), CliError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, value)?;
    } else {
        serde_json::to_writer(&mut *writer, value)?;
    }
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
