/// Single-quote `s` for POSIX `sh`: replace `'` with `'\''` and wrap.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
