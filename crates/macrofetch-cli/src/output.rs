use std::io::{self, Write};

use serde::Serialize;

use crate::error::CliError;

pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    write_json(&mut stdout.lock(), value, pretty)
}

fn write_json<T: Serialize>(
    writer: &mut impl Write,
    value: &T,
    pretty: bool,
) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(writer, "{payload}")?;
    Ok(())
}
