use crate::error::Error;
use clap::Parser;

/// Default STUN server port when the server string carries none
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Default SOCKS5 proxy port when the proxy string carries none
pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// Args is the command line surface of the tester
#[derive(Parser, Debug)]
#[command(author, version, about = "NAT type tester", long_about = None)]
pub struct Args {
    /// STUN server host[:port]
    pub server: Option<String>,

    /// STUN server host[:port] (takes precedence over the positional argument)
    #[arg(short = 's', long = "server")]
    pub server_opt: Option<String>,

    /// Port to use when the server has no inline port
    #[arg(short, long, default_value_t = DEFAULT_STUN_PORT)]
    pub port: u16,

    /// Use the RFC 3489 classic client
    #[arg(short = '3', long = "3489")]
    pub rfc3489: bool,

    /// Prefer IPv6 resolution results
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// SOCKS5 proxy host[:port]
    #[arg(short = 'x', long)]
    pub proxy: Option<String>,

    /// SOCKS5 proxy user[:password], prompts for the password if omitted
    #[arg(short = 'U', long = "proxy-user")]
    pub proxy_user: Option<String>,

    /// Use TCP
    #[arg(short, long)]
    pub tcp: bool,

    /// Use TLS (TCP only)
    #[arg(short = 'l', long)]
    pub tls: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Config is the validated run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub rfc3489: bool,
    pub prefer_ipv6: bool,
    pub proxy: Option<String>,
    pub proxy_user: Option<String>,
    pub tcp: bool,
    pub tls: bool,
}

impl TryFrom<Args> for Config {
    type Error = Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let server = args
            .server_opt
            .or(args.server)
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingServerArgument)?;

        Ok(Config {
            server,
            port: args.port,
            rfc3489: args.rfc3489,
            prefer_ipv6: args.ipv6,
            // empty strings behave like absent flags
            proxy: args.proxy.filter(|p| !p.is_empty()),
            proxy_user: args.proxy_user.filter(|u| !u.is_empty()),
            tcp: args.tcp,
            tls: args.tls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(argv: &[&str]) -> Result<Config, Error> {
        let args = Args::try_parse_from(argv).expect("argv parses");
        Config::try_from(args)
    }

    #[test]
    fn positional_server_with_defaults() {
        let cfg = config(&["natprobe", "stun.example.com:3478"]).unwrap();
        assert_eq!(cfg.server, "stun.example.com:3478");
        assert_eq!(cfg.port, DEFAULT_STUN_PORT);
        assert!(!cfg.tcp && !cfg.tls && !cfg.rfc3489 && !cfg.prefer_ipv6);
        assert_eq!(cfg.proxy, None);
    }

    #[test]
    fn server_option_wins_over_positional() {
        let cfg = config(&["natprobe", "a.example", "-s", "b.example"]).unwrap();
        assert_eq!(cfg.server, "b.example");
    }

    #[test]
    fn missing_server_is_reported() {
        let err = config(&["natprobe", "-t"]).unwrap_err();
        assert!(matches!(err, Error::MissingServerArgument));
    }

    #[test]
    fn short_flags_map_to_fields() {
        let cfg = config(&[
            "natprobe", "-s", "stun.example.com", "-p", "19302", "-6", "-3", "-x", "proxy.local",
            "-U", "bob:pw", "-t", "-l",
        ])
        .unwrap();
        assert_eq!(cfg.port, 19302);
        assert!(cfg.prefer_ipv6 && cfg.rfc3489 && cfg.tcp && cfg.tls);
        assert_eq!(cfg.proxy.as_deref(), Some("proxy.local"));
        assert_eq!(cfg.proxy_user.as_deref(), Some("bob:pw"));
    }

    #[test]
    fn empty_proxy_is_absent() {
        let cfg = config(&["natprobe", "stun.example.com", "--proxy", "", "-U", ""]).unwrap();
        assert_eq!(cfg.proxy, None);
        assert_eq!(cfg.proxy_user, None);
    }
}
