//! SIP URI syntax validation
//!
//! Only the syntax the softphone needs to reject user typos is covered:
//!
//! ```text
//! SIP-URI  = ("sip:" / "sips:") [ userinfo "@" ] hostport uri-parameters [ headers ]
//! userinfo = user [ ":" password ]
//! hostport = host [ ":" port ]
//! host     = hostname / IPv4address / "[" IPv6address "]"
//! ```
//!
//! Full message parsing belongs to the signaling stack.
//!
//! ```rust
//! use rvoip_softphone_core::uri::{Host, SipUri};
//!
//! let uri: SipUri = "sip:alice@proxy.example.com:5060;transport=udp".parse().unwrap();
//! assert_eq!(uri.user.as_deref(), Some("alice"));
//! assert_eq!(uri.host, Host::Domain("proxy.example.com".to_string()));
//! assert_eq!(uri.port, Some(5060));
//!
//! assert!("sip:alice@".parse::<SipUri>().is_err());
//! ```

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::digit1,
    combinator::{all_consuming, map, map_res, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{SoftphoneError, SoftphoneResult};

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Sip,
    Sips,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Sip => write!(f, "sip"),
            Scheme::Sips => write!(f, "sips"),
        }
    }
}

/// Host part of a SIP URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Domain(String),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Domain(name) => write!(f, "{}", name),
            Host::Ipv4(addr) => write!(f, "{}", addr),
            Host::Ipv6(addr) => write!(f, "[{}]", addr),
        }
    }
}

/// A syntactically valid `sip:` or `sips:` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SipUri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Host,
    pub port: Option<u16>,
    /// `;name[=value]` parameters in order of appearance
    pub parameters: Vec<(String, Option<String>)>,
    /// `?name=value&...` headers in order of appearance
    pub headers: Vec<(String, String)>,
}

impl SipUri {
    /// Parse and validate a URI string
    pub fn parse(input: &str) -> SoftphoneResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SoftphoneError::invalid_uri(input, "empty URI"));
        }

        match all_consuming(sip_uri)(trimmed) {
            Ok((_, uri)) => Ok(uri),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let reason = if e.input.is_empty() {
                    "unexpected end of URI".to_string()
                } else {
                    format!("unexpected input at '{}'", e.input)
                };
                Err(SoftphoneError::invalid_uri(input, reason))
            }
            Err(nom::Err::Incomplete(_)) => Err(SoftphoneError::invalid_uri(input, "incomplete URI")),
        }
    }

    /// `host[:port]` as it would appear in a Via or Route header
    pub fn host_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.to_string(),
        }
    }

    /// Look up a URI parameter by name (case-insensitive)
    pub fn parameter(&self, name: &str) -> Option<Option<&str>> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_deref())
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}", user)?;
            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", self.host_port())?;
        for (name, value) in &self.parameters {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        for (i, (name, value)) in self.headers.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = SoftphoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SipUri::parse(s)
    }
}

impl TryFrom<String> for SipUri {
    type Error = SoftphoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SipUri::parse(&value)
    }
}

impl From<SipUri> for String {
    fn from(uri: SipUri) -> Self {
        uri.to_string()
    }
}

// unreserved = alphanum / mark
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c)
}

// user = 1*( unreserved / escaped / user-unreserved )
fn is_user_char(c: char) -> bool {
    is_unreserved(c) || c == '%' || "&=+$,;?/".contains(c)
}

fn is_password_char(c: char) -> bool {
    is_unreserved(c) || c == '%' || "&=+$,".contains(c)
}

fn is_param_char(c: char) -> bool {
    is_unreserved(c) || c == '%' || "[]/:&+$".contains(c)
}

fn is_header_char(c: char) -> bool {
    is_unreserved(c) || c == '%' || "[]/?:+$".contains(c)
}

fn scheme(input: &str) -> IResult<&str, Scheme> {
    alt((
        map(tag_no_case("sips:"), |_| Scheme::Sips),
        map(tag_no_case("sip:"), |_| Scheme::Sip),
    ))(input)
}

fn userinfo(input: &str) -> IResult<&str, (String, Option<String>)> {
    terminated(
        pair(
            take_while1(is_user_char),
            opt(preceded(tag(":"), take_while(is_password_char))),
        ),
        tag("@"),
    )(input)
    .map(|(rest, (user, password))| (rest, (user.to_string(), password.map(str::to_string))))
}

fn validate_hostname(name: &str) -> Result<Host, &'static str> {
    if name.split('.').all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_digit())) {
        return name
            .parse::<Ipv4Addr>()
            .map(Host::Ipv4)
            .map_err(|_| "malformed IPv4 address");
    }

    let labels: Vec<&str> = name.trim_end_matches('.').split('.').collect();
    for label in &labels {
        if label.is_empty() {
            return Err("empty domain label");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("domain label starts or ends with '-'");
        }
    }

    // toplabel = ALPHA / ALPHA *( alphanum / "-" ) alphanum
    match labels.last().and_then(|top| top.chars().next()) {
        Some(c) if c.is_ascii_alphabetic() => Ok(Host::Domain(name.to_string())),
        _ => Err("top-level domain label must start with a letter"),
    }
}

fn hostname(input: &str) -> IResult<&str, Host> {
    map_res(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.'),
        validate_hostname,
    )(input)
}

fn ipv6_reference(input: &str) -> IResult<&str, Host> {
    map_res(
        delimited(
            tag("["),
            take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
            tag("]"),
        ),
        |addr: &str| addr.parse::<Ipv6Addr>().map(Host::Ipv6),
    )(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |digits: &str| digits.parse::<u16>())(input)
}

fn hostport(input: &str) -> IResult<&str, (Host, Option<u16>)> {
    pair(alt((ipv6_reference, hostname)), opt(preceded(tag(":"), port)))(input)
}

fn uri_parameter(input: &str) -> IResult<&str, (String, Option<String>)> {
    preceded(
        tag(";"),
        pair(
            take_while1(is_param_char),
            opt(preceded(tag("="), take_while1(is_param_char))),
        ),
    )(input)
    .map(|(rest, (name, value))| (rest, (name.to_string(), value.map(str::to_string))))
}

fn uri_header(input: &str) -> IResult<&str, (String, String)> {
    pair(
        terminated(take_while1(is_header_char), tag("=")),
        take_while(is_header_char),
    )(input)
    .map(|(rest, (name, value))| (rest, (name.to_string(), value.to_string())))
}

fn uri_headers(input: &str) -> IResult<&str, Vec<(String, String)>> {
    preceded(tag("?"), separated_list1(tag("&"), uri_header))(input)
}

fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    map(
        tuple((scheme, opt(userinfo), hostport, many0(uri_parameter), opt(uri_headers))),
        |(scheme, userinfo, (host, port), parameters, headers)| {
            let (user, password) = match userinfo {
                Some((user, password)) => (Some(user), password),
                None => (None, None),
            };
            SipUri {
                scheme,
                user,
                password,
                host,
                port,
                parameters,
                headers: headers.unwrap_or_default(),
            }
        },
    )(input)
}
