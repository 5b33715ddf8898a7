// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Property tests for the invocation wire codec
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 3 property tests
//!
//! TEST_SCENARIOS:
//!   - decoders_never_panic(): arbitrary bytes are rejected, not crashed on
//!   - request_survives_the_wire(): any encodable request decodes back unchanged
//!   - signature_is_preserved(): the decoded signature equals the sent one

use proptest::prelude::*;
use tdma_abi::wire::{decode_reply, decode_request, encode_request, Request};
use tdma_abi::{Param, Params};

fn param() -> impl Strategy<Value = Param> {
    prop_oneof![
        Just(Param::None),
        (any::<u32>(), any::<u32>()).prop_map(|(a, b)| Param::ValueIn { a, b }),
        Just(Param::value_out()),
        (any::<u32>(), any::<u32>()).prop_map(|(a, b)| Param::ValueInOut { a, b }),
        proptest::collection::vec(any::<u8>(), 0..256).prop_map(Param::BufferIn),
        (0usize..256).prop_map(Param::buffer_out),
        proptest::collection::vec(any::<u8>(), 0..256).prop_map(Param::BufferInOut),
    ]
}

fn request() -> impl Strategy<Value = Request> {
    (any::<u32>(), any::<u32>(), [param(), param(), param(), param()])
        .prop_map(|(cmd, nonce, slots)| Request { cmd, nonce, params: Params::new(slots) })
}

proptest! {
    #[test]
    fn decoders_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_request(&bytes);
        let _ = decode_reply(&bytes);
    }

    #[test]
    fn request_survives_the_wire(req in request()) {
        let frame = encode_request(&req).unwrap();
        prop_assert_eq!(decode_request(&frame).unwrap(), req);
    }

    #[test]
    fn signature_is_preserved(req in request()) {
        let frame = encode_request(&req).unwrap();
        let decoded = decode_request(&frame).unwrap();
        prop_assert_eq!(decoded.params.types(), req.params.types());
    }
}
