// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests for the wire framing layer.

use proptest::prelude::*;

use crate::{read_message, write_message};

proptest! {
    #[test]
    fn framing_roundtrips_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let mut buffer = Vec::new();
            write_message(&mut buffer, &payload).await.unwrap();
            let mut cursor = std::io::Cursor::new(buffer);
            let back = read_message(&mut cursor).await.unwrap();
            prop_assert_eq!(back, payload);
            Ok(())
        })?;
    }

    #[test]
    fn consecutive_frames_do_not_bleed(a in proptest::collection::vec(any::<u8>(), 0..512),
                                       b in proptest::collection::vec(any::<u8>(), 0..512)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let mut buffer = Vec::new();
            write_message(&mut buffer, &a).await.unwrap();
            write_message(&mut buffer, &b).await.unwrap();
            let mut cursor = std::io::Cursor::new(buffer);
            let first = read_message(&mut cursor).await.unwrap();
            let second = read_message(&mut cursor).await.unwrap();
            prop_assert_eq!(first, a);
            prop_assert_eq!(second, b);
            Ok(())
        })?;
    }
}
