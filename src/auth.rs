use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Reads the vault password, trying sources in order:
///
/// 1. the `VAULTSTREAM_PASSWORD` environment variable
/// 2. piped stdin: `echo "pw" | vaultstream open vault.vstr out.txt`
/// 3. an interactive prompt when stdin is a terminal
pub fn read_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("VAULTSTREAM_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    }

    if io::stdin().is_terminal() {
        let pw = rpassword::prompt_password("Password: ")?;
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    bail!("no password provided")
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
