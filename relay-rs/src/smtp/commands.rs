use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RelayError::SmtpProtocol("Empty command".to_string()));
        }

        let parts: Vec<&str> = line.splitn(2, ' ').collect();
        let command = parts[0].to_uppercase();
        let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

        match command.as_str() {
            "HELO" => {
                if args.is_empty() {
                    return Err(RelayError::SmtpProtocol("HELO requires domain".to_string()));
                }
                Ok(SmtpCommand::Helo(args.to_string()))
            }
            "EHLO" => {
                if args.is_empty() {
                    return Err(RelayError::SmtpProtocol("EHLO requires domain".to_string()));
                }
                Ok(SmtpCommand::Ehlo(args.to_string()))
            }
            "MAIL" => Ok(SmtpCommand::MailFrom(Self::parse_path(args, "FROM:")?)),
            "RCPT" => {
                let to = Self::parse_path(args, "TO:")?;
                if to.is_empty() {
                    return Err(RelayError::SmtpProtocol("Empty recipient".to_string()));
                }
                Ok(SmtpCommand::RcptTo(to))
            }
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            _ => Ok(SmtpCommand::Unknown(command)),
        }
    }

    /// Extract the address from `FROM:<addr> [params]` / `TO:<addr> [params]`.
    ///
    /// ESMTP parameters such as `SIZE=` or `BODY=8BITMIME` are dropped. The
    /// null reverse-path `<>` yields an empty string.
    fn parse_path(args: &str, keyword: &str) -> Result<String> {
        match args.get(..keyword.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(keyword) => {}
            _ => {
                return Err(RelayError::SmtpProtocol(format!(
                    "Invalid syntax, expected {}",
                    keyword
                )));
            }
        }

        let path = args[keyword.len()..].trim_start();
        let address = if let Some(rest) = path.strip_prefix('<') {
            match rest.find('>') {
                Some(end) => &rest[..end],
                None => {
                    return Err(RelayError::SmtpProtocol("Unterminated path".to_string()));
                }
            }
        } else {
            path.split_whitespace().next().unwrap_or("")
        };

        Ok(address.trim().to_string())
    }
}
