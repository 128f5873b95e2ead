//! Domain `server` blocks and stream files.
//!
//! # Responsibilities
//! - TLS server block for a domain, pulling in its location directory
//! - One `upstream` plus one `server` per TCP/UDP service

use crate::model::{Domain, Node, SslPair, StreamProto, TcpService};
use crate::nginx::block::NginxConf;
use crate::nginx::layout::NginxLayout;
use crate::nginx::location::Backend;

/// `server { ... }` terminating TLS for a domain.
pub fn domain_server(domain: &Domain, layout: &NginxLayout) -> NginxConf {
    let name = domain.domain.as_str();
    let mut server = NginxConf::new();
    server.add("listen", "443 ssl").add("listen", "[::]:443 ssl");
    if !name.is_empty() && name != "_" {
        server.add("server_name", name);
    }
    server
        .add(
            "access_log",
            format!(
                "{} combined buffer=64k flush=1s",
                layout.log_file(Some(name), "access.log").display()
            ),
        )
        .add("error_log", layout.log_file(Some(name), "error.log").to_string_lossy());

    server.comment("SSL");
    ssl_pair(&mut server, &domain.ssl_pair);

    server
        .comment("Security partial")
        .add("include", "partials/security.conf");

    server
        .comment("Locations")
        .add("include", layout.locations_include(name));

    server.wrap("server")
}

/// Stream file for a TCP/UDP service. `ssl` is the pair to terminate with,
/// if the service terminates TLS.
pub fn stream_conf(
    service: &TcpService,
    node: &Node,
    ssl: Option<&SslPair>,
    layout: &NginxLayout,
) -> NginxConf {
    let identifier = service.identifier();
    let backend = Backend::for_node(node, &service.backend_host);
    let mut conf = NginxConf::new();

    if let Some(nameserver) = backend.resolver {
        conf.add("resolver", format!("{} valid=30s", nameserver));
    }

    let mut upstream = NginxConf::new();
    upstream.add("server", format!("{}:{}", backend.host, service.backend_port));
    conf.add_block(format!("upstream {}", identifier), upstream);

    let mut server = NginxConf::new();
    server.access_rules(&service.access);
    let listen = match service.proto {
        StreamProto::Tcp => service.port.to_string(),
        StreamProto::Udp => format!("{} udp", service.port),
    };
    server.add("listen", listen);
    if let Some(domain) = service.domain.as_deref() {
        server.add("server_name", domain);
    }
    server.add(
        "access_log",
        format!(
            "{} stream_logs buffer=64k flush=1s",
            layout
                .log_file(service.domain.as_deref(), &format!("{}_stream.log", identifier))
                .display()
        ),
    );

    if let Some(pair) = ssl.filter(|_| service.ssl) {
        server.comment("SSL");
        ssl_pair(&mut server, pair);
        server.add("include", "partials/stream_ssl.conf");
    }

    server.comment("PROXY").add("proxy_pass", identifier);

    conf.add_block("server", server);
    conf
}

fn ssl_pair(conf: &mut NginxConf, pair: &SslPair) {
    conf.add("ssl_certificate", pair.cert.to_string_lossy())
        .add("ssl_certificate_key", pair.key.to_string_lossy());
}
