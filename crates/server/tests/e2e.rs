//! End-to-end scenarios S1-S6, run against a live `Server` over real TCP
//! sockets with a real client on the other end.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use sfap_client::Client;
use sfap_protocol::AccessResult;
use sfap_server::{AuthGrant, Server, ServerConfig};

type ClientCredentials = sfap_client::Credentials;

fn bind_with_root(root: std::path::PathBuf) -> Server {
    let config = ServerConfig {
        auth_middleware: Box::new(move |credentials: &sfap_server::Credentials| {
            if credentials.username == "u" && credentials.password == "p" {
                (
                    sfap_protocol::AuthResult::Ok,
                    Some(AuthGrant {
                        username: credentials.username.clone(),
                        root: root.clone(),
                        home: None,
                    }),
                )
            } else {
                (sfap_protocol::AuthResult::UnknownUser, None)
            }
        }),
        ..ServerConfig::default()
    };

    Server::bind("127.0.0.1:0", config).unwrap()
}

#[test]
fn s1_magic_none_round_trip() {
    let server = bind_with_root(std::env::temp_dir());
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();

    stream.write_all(&[0x53, 0x46, 0x41, 0x50, 0x00, 0x00]).unwrap();

    let mut reply = [0u8; 1];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply, [0x00]);
}

#[test]
fn s2_auth_round_trip_then_pwd() {
    let dir = tempfile::tempdir().unwrap();
    let server = bind_with_root(dir.path().to_path_buf());

    let mut client = Client::connect(server.local_addr().unwrap()).unwrap();
    client
        .authorize(&ClientCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap();

    assert_eq!(client.username(), Some("u"));
    assert_eq!(client.pwd(true).unwrap(), "/");

    assert_eq!(client.pwd(false).unwrap(), "/");
}

#[test]
fn s3_cd_and_containment() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("etc")).unwrap();
    let server = bind_with_root(dir.path().to_path_buf());

    let mut client = Client::connect(server.local_addr().unwrap()).unwrap();
    client
        .authorize(&ClientCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap();

    assert_eq!(client.cd("/etc").unwrap(), "/etc");

    let err = client.cd("../../..").unwrap_err();
    assert!(matches!(err, sfap_client::ClientError::AccessFailed(AccessResult::AccessDenied)));

    assert_eq!(client.pwd(true).unwrap(), "/etc");
}

#[test]
fn s4_ls_on_empty_root() {
    let dir = tempfile::tempdir().unwrap();
    let server = bind_with_root(dir.path().to_path_buf());

    let mut client = Client::connect(server.local_addr().unwrap()).unwrap();
    client
        .authorize(&ClientCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap();

    let entries = client.ls("/").unwrap();
    assert!(entries.is_empty());
}

#[test]
fn s5_descriptor_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let server = bind_with_root(dir.path().to_path_buf());

    let mut client = Client::connect(server.local_addr().unwrap()).unwrap();
    client
        .authorize(&ClientCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap();

    let descriptor = client.open_descriptor("/a.txt", sfap_protocol::open_mode::WRITE).unwrap();
    assert_eq!(descriptor, 1);
    assert!(dir.path().join("a.txt").is_file());

    assert_eq!(client.descriptors().unwrap(), vec![1]);

    client.clear().unwrap();
    assert_eq!(client.descriptors().unwrap(), Vec::<u32>::new());
}

#[test]
fn s6_desync_reaps_session_within_one_cycle() {
    let server = bind_with_root(std::env::temp_dir());
    let mut stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();

    stream.write_all(&[0, 0, 0, 0, 0, 0]).unwrap();
    let mut buf = [0u8; 1];
    let _ = stream.read(&mut buf);
    drop(stream);

    std::thread::sleep(Duration::from_millis(1300));

    assert_eq!(server.session_count(), 0);
    assert_eq!(server.finished_session_count(), 1);
}
