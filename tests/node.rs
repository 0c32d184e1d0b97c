use dhtbench::{BenchError, NodeAddress, NodeSet};

#[test]
fn accepts_names_ipv4_and_bracketed_ipv6() {
    for addr in &["127.0.0.1:8080", "node-3.cluster.local:80", "[::1]:9000", "[fe80::1]:1"] {
        let parsed: NodeAddress = addr.parse().unwrap();
        assert_eq!(parsed.as_str(), *addr);
    }
    assert_eq!("[::1]:9000".parse::<NodeAddress>().unwrap().port(), 9000);
}

#[test]
fn rejects_malformed_addresses() {
    for addr in &[
        "localhost",
        ":80",
        "host:",
        "host:99999",
        "::1:80",
        "a:b:80",
        "[::1:80",
        "[zz]:80",
        "user@host:80",
        "host/x:80",
        "two words:80",
    ] {
        let err = addr.parse::<NodeAddress>().unwrap_err();
        assert!(matches!(err, BenchError::InvalidAddress(_)), "{} gave {:?}", addr, err);
    }
}

#[test]
fn node_sets_keep_their_order() {
    let nodes = NodeSet::parse(vec!["10.0.0.1:1", " 10.0.0.2:2 ", "10.0.0.3:3"]).unwrap();

    assert_eq!(nodes.bootstrap().as_str(), "10.0.0.1:1");
    assert_eq!(nodes.others().len(), 2);
    assert_eq!(nodes.round_robin(4).as_str(), "10.0.0.2:2");
    assert_eq!(nodes.prefix(0).len(), 1);
    assert_eq!(nodes.prefix(10).len(), 3);
}

#[test]
fn empty_node_sets_are_refused() {
    assert!(matches!(NodeSet::parse(Vec::<String>::new()), Err(BenchError::EmptyNodeSet)));
    assert!(matches!(NodeSet::from_json("[]"), Err(BenchError::EmptyNodeSet)));
    assert!(NodeSet::from_json(r#"["::1:80"]"#).is_err());
}
