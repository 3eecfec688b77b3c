//
// Copyright (c) The Ospfd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use ospfd_engine::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthKey, AuthMethod};
use ospfd_engine::packet::lsa::{
    Lsa, LsaBody, LsaKey, LsaRouter, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaSummary, LsaTypeCode,
};
use ospfd_engine::packet::lsa_opaque::{
    GrReasonTlv, GracePeriodTlv, LsaGrace, LsaOpaque,
};
use ospfd_engine::packet::{
    Hello, LsAck, LsRequest, LsUpdate, Options, Packet, PacketHdr, PacketType,
};

//
// Helper functions.
//

fn test_encode_packet(
    bytes_expected: &[u8],
    auth: &Option<(AuthKey, u32)>,
    packet: &Packet,
) {
    let auth_ctx = auth.as_ref().map(|(key, seqno)| {
        AuthEncodeCtx::Cryptographic { key, seqno: *seqno }
    });
    let bytes_actual = packet.encode(auth_ctx);
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(
    bytes: &[u8],
    auth: &Option<(AuthKey, u32)>,
    packet_expected: &Packet,
) {
    let auth_method = auth
        .as_ref()
        .map(|(key, _)| AuthMethod::Cryptographic(vec![key.clone()]));
    let auth_ctx = auth_method
        .as_ref()
        .map(|method| AuthDecodeCtx { method, now: 0 });
    let packet_actual = Packet::decode(bytes, auth_ctx.as_ref()).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = bytes::Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

fn md5_key(key: &str) -> AuthKey {
    AuthKey {
        id: 1,
        key: key.as_bytes().to_vec(),
        start_accept: None,
        start_generate: None,
        stop_generate: None,
        stop_accept: None,
    }
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x01, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0xf6, 0x9e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03,
                0x02, 0x01, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01,
            ],
            None,
            Packet::Hello(Hello {
                hdr: PacketHdr {
                    pkt_type: PacketType::Hello,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                network_mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                hello_interval: 3,
                options: Options::E,
                priority: 1,
                dead_interval: 36,
                dr: None,
                bdr: None,
                neighbors: [Ipv4Addr::from_str("1.1.1.1").unwrap()].into(),
            }),
        )
    });

static HELLO1_MD5: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x01, 0x00, 0x34, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01, 0x10,
                0x32, 0x45, 0xd0, 0x14, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03,
                0x02, 0x01, 0x00, 0x00, 0x00, 0x0c, 0x0a, 0x00, 0x01, 0x03,
                0x0a, 0x00, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03,
                0x03, 0x03, 0xc5, 0x0e, 0x43, 0x89, 0xbd, 0x40, 0xe3, 0x22,
                0xb3, 0x72, 0x8a, 0x63, 0xcf, 0xc0, 0x23, 0x1f,
            ],
            Some((md5_key("ospfd"), 843436052)),
            Packet::Hello(Hello {
                hdr: PacketHdr {
                    pkt_type: PacketType::Hello,
                    router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.0").unwrap(),
                    auth_seqno: Some(843436052),
                },
                network_mask: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                hello_interval: 3,
                options: Options::E,
                priority: 1,
                dead_interval: 12,
                dr: Some(Ipv4Addr::from_str("10.0.1.3").unwrap()),
                bdr: Some(Ipv4Addr::from_str("10.0.1.2").unwrap()),
                neighbors: [
                    Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    Ipv4Addr::from_str("3.3.3.3").unwrap(),
                ]
                .into(),
            }),
        )
    });

static LSREQUEST1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x03, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0x46, 0xab, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01,
                0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x05,
                0xac, 0x10, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01,
            ],
            None,
            Packet::LsRequest(LsRequest {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsRequest,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                entries: vec![
                    LsaKey {
                        lsa_type: LsaTypeCode::Router.into(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        lsa_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                    },
                    LsaKey {
                        lsa_type: LsaTypeCode::AsExternal.into(),
                        adv_rtr: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                        lsa_id: Ipv4Addr::from_str("172.16.1.0").unwrap(),
                    },
                ],
            }),
        )
    });

static LSUPDATE1: Lazy<(Vec<u8>, Option<(AuthKey, u32)>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x04, 0x00, 0x78, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0x40, 0xa1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x31,
                0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
                0x80, 0x00, 0x00, 0x02, 0x37, 0xf4, 0x00, 0x24, 0x01, 0x00,
                0x00, 0x01, 0x0a, 0x00, 0x01, 0x00, 0xff, 0xff, 0xff, 0x00,
                0x03, 0x00, 0x00, 0x0a, 0x00, 0x31, 0x02, 0x03, 0x02, 0x02,
                0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01,
                0xd2, 0x7a, 0x00, 0x1c, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x31, 0x02, 0x03, 0x0a, 0x00, 0x02, 0x00,
                0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xfa, 0x44,
                0x00, 0x1c, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x0a,
            ],
            None,
            Packet::LsUpdate(LsUpdate {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsUpdate,
                    router_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                    area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
                    auth_seqno: None,
                },
                lsas: vec![
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000002,
                        LsaBody::Router(LsaRouter {
                            flags: LsaRouterFlags::B,
                            links: vec![LsaRouterLink {
                                link_type: LsaRouterLinkType::StubNetwork,
                                link_id: Ipv4Addr::from_str("10.0.1.0")
                                    .unwrap(),
                                link_data: Ipv4Addr::from_str(
                                    "255.255.255.0",
                                )
                                .unwrap(),
                                metric: 10,
                            }],
                        }),
                    ),
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000001,
                        LsaBody::SummaryNetwork(LsaSummary {
                            mask: Ipv4Addr::from_str("255.255.255.255")
                                .unwrap(),
                            metric: 0,
                        }),
                    ),
                    Lsa::new(
                        49,
                        Options::E,
                        Ipv4Addr::from_str("10.0.2.0").unwrap(),
                        Ipv4Addr::from_str("2.2.2.2").unwrap(),
                        0x80000001,
                        LsaBody::SummaryNetwork(LsaSummary {
                            mask: Ipv4Addr::from_str("255.255.255.0")
                                .unwrap(),
                            metric: 10,
                        }),
                    ),
                ],
            }),
        )
    });

static LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x31, 0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x02, 0x37, 0xf4, 0x00, 0x24, 0x01, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x01, 0x00, 0xff, 0xff, 0xff, 0x00, 0x03,
            0x00, 0x00, 0x0a,
        ],
        Lsa::new(
            49,
            Options::E,
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            Ipv4Addr::from_str("2.2.2.2").unwrap(),
            0x80000002,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::B,
                links: vec![LsaRouterLink {
                    link_type: LsaRouterLinkType::StubNetwork,
                    link_id: Ipv4Addr::from_str("10.0.1.0").unwrap(),
                    link_data: Ipv4Addr::from_str("255.255.255.0").unwrap(),
                    metric: 10,
                }],
            }),
        ),
    )
});

static GRACE_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x42, 0x09, 0x03, 0x00, 0x00, 0x00, 0x06, 0x06, 0x06,
            0x06, 0x80, 0x00, 0x00, 0x01, 0x7e, 0xf4, 0x00, 0x24, 0x00, 0x01,
            0x00, 0x04, 0x00, 0x00, 0x00, 0x78, 0x00, 0x02, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00,
        ],
        Lsa::new(
            1,
            Options::O | Options::E,
            Ipv4Addr::from_str("3.0.0.0").unwrap(),
            Ipv4Addr::from_str("6.6.6.6").unwrap(),
            0x80000001,
            LsaBody::OpaqueLink(LsaOpaque::Grace(LsaGrace {
                grace_period: Some(GracePeriodTlv::new(120)),
                gr_reason: Some(GrReasonTlv::new(0)),
                addr: None,
            })),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_encode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5_wrong_key() {
    let (ref bytes, _, _) = *HELLO1_MD5;
    let method = AuthMethod::Cryptographic(vec![md5_key("wrong")]);
    let auth_ctx = AuthDecodeCtx {
        method: &method,
        now: 0,
    };
    assert!(Packet::decode(bytes, Some(&auth_ctx)).is_err());
}

#[test]
fn test_decode_hello_corrupted_cksum() {
    let (ref bytes, _, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[30] ^= 0xff;
    assert!(Packet::decode(&bytes, None).is_err());
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_encode_packet(bytes, auth, request);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_decode_packet(bytes, auth, request);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupd) = *LSUPDATE1;
    test_encode_packet(bytes, auth, lsupd);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupd) = *LSUPDATE1;
    test_decode_packet(bytes, auth, lsupd);
}

#[test]
fn test_encode_lsack1() {
    // An LS Ack is a sequence of LSA headers; reuse LSA1's header.
    let (_, ref lsa) = *LSA1;
    let packet = Packet::LsAck(LsAck {
        hdr: PacketHdr {
            pkt_type: PacketType::LsAck,
            router_id: Ipv4Addr::from_str("1.1.1.1").unwrap(),
            area_id: Ipv4Addr::from_str("0.0.0.1").unwrap(),
            auth_seqno: None,
        },
        lsa_hdrs: vec![lsa.hdr],
    });
    let bytes = packet.encode(None);
    let decoded = Packet::decode(&bytes, None).unwrap();
    assert_eq!(packet, decoded);
}

#[test]
fn test_encode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_grace_lsa1() {
    let (ref bytes, ref lsa) = *GRACE_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_grace_lsa1() {
    let (ref bytes, ref lsa) = *GRACE_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_grace_lsa_accessor() {
    let (_, ref lsa) = *GRACE_LSA1;
    let (period, _, addr) = lsa.body.as_grace().unwrap();
    assert_eq!(period, 120);
    assert_eq!(addr, None);
}
