//! Encode a shared, cyclic graph and decode it back.

use json_knot::{decode, encode, DecodeOptions, EncodeOptions, NodeBody, Value};

fn main() {
    // A record shared by two slots of a sequence, plus a cycle back to
    // the sequence itself.
    let shared = Value::record();
    if let Value::Node(node) = &shared {
        node.borrow_mut()
            .props
            .push((Value::text("name"), Value::text("shared")));
    }

    let root = Value::sequence(vec![shared.clone(), shared.clone(), Value::Number(1.0)]);
    if let Value::Node(node) = &root {
        let me = root.clone();
        if let NodeBody::Sequence(items) = &mut node.borrow_mut().body {
            items.push(me);
        }
    }

    let wire = encode(&root, &EncodeOptions::default()).expect("encode failed");
    println!("wire text ({} bytes):", wire.len());
    println!("{wire}");

    let pretty = encode(
        &root,
        &EncodeOptions {
            compress: false,
            pretty: true,
            ..Default::default()
        },
    )
    .expect("encode failed");
    println!("\nuncompressed form:");
    println!("{pretty}");

    let decoded = decode(&wire, &DecodeOptions::default()).expect("decode failed");
    let node = decoded.as_node().expect("expected a node");
    let node = node.borrow();
    let NodeBody::Sequence(items) = &node.body else {
        panic!("expected a sequence");
    };

    println!("\ndecoded {} items", items.len());
    println!("items[0] is items[1]: {}", items[0].same_node(&items[1]));
    println!("items[3] is the root: {}", items[3].same_node(&decoded));
}
