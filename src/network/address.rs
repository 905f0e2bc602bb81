use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::{AppError, AppResult};

/// Parses a listen address of the form `host:port`.
///
/// `host` may be empty or `*` for all interfaces, an IPv4 literal, or an
/// IPv6 literal in brackets. Host names are not resolved.
pub fn parse_listen_address(addr: &str) -> AppResult<SocketAddr> {
    let format_error = || AppError::AddressFormat(addr.to_string());

    let (host, port) = addr.trim().rsplit_once(':').ok_or_else(format_error)?;
    let port: u16 = port.parse().map_err(|_| format_error())?;

    let ip = match host {
        "" | "*" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        _ => {
            if let Some(v6) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                IpAddr::V6(v6.parse::<Ipv6Addr>().map_err(|_| format_error())?)
            } else {
                IpAddr::V4(host.parse::<Ipv4Addr>().map_err(|_| format_error())?)
            }
        }
    };
    Ok(SocketAddr::new(ip, port))
}
