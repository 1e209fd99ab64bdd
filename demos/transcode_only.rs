//! Run the streaming transcoder on a canned upstream stream, without a server.
//!
//! Usage:
//!   `cargo run --example transcode_only`

use reasoning_proxy::{ReasoningConfig, StreamTranscoder};

const UPSTREAM: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"The user wants \"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"the capital of France.\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Paris.\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

fn main() {
    for show_reasoning in [true, false] {
        println!("=== show_reasoning = {show_reasoning} ===");

        let mut transcoder = StreamTranscoder::new(ReasoningConfig {
            show_reasoning,
            thinking_mode: false,
        });

        // Feed in small, uneven pieces the way a network would deliver them
        for (i, chunk) in UPSTREAM.as_bytes().chunks(11).enumerate() {
            for frame in transcoder.feed(chunk) {
                print!("  chunk {i:>3} -> {}", String::from_utf8_lossy(&frame));
            }
        }

        let (frames, stats) = transcoder.finish();
        for frame in frames {
            print!("  finish    -> {}", String::from_utf8_lossy(&frame));
        }
        println!(
            "  forwarded={} suppressed={} malformed={}",
            stats.forwarded, stats.suppressed, stats.malformed
        );
        println!();
    }
}
