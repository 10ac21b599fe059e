// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Control channel round-trips over a loopback socket.

use castkit_core::shared;
use castkit_engine::controller::Controller;
use castkit_engine::pipeline::{shared_manager, PipelineManager};
use castkit_engine::registry::FilterRegistry;
use castkit_filters::test_utils::{byte_format, feed_filter, Identity};
use castkit_filters::AudioMixer;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

fn start_controller() -> (u16, std::thread::JoinHandle<()>, castkit_engine::pipeline::SharedManager)
{
    let mut manager = PipelineManager::new();
    let mut registry = FilterRegistry::new();
    registry.register("identity", |_params| Ok(shared(Identity::new())));
    manager.set_registry(registry);

    let mut mixer = AudioMixer::new(2);
    let _input = feed_filter(&mut mixer, 1, byte_format());
    manager.add_filter(5, shared(mixer)).expect("add mixer");

    let manager = shared_manager(manager);
    let controller = Controller::bind(manager.clone(), 0).expect("bind control socket");
    let port = controller.local_port().expect("bound port");
    let handle = std::thread::spawn(move || {
        controller.run().expect("controller run");
    });
    (port, handle, manager)
}

fn roundtrip(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, msg: &Value) -> Value {
    let mut line = msg.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).expect("send");
    let mut response = String::new();
    reader.read_line(&mut response).expect("receive");
    serde_json::from_str(response.trim()).expect("response is JSON")
}

#[test]
fn control_events_route_to_manager_and_filters() {
    let (port, handle, _manager) = start_controller();

    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));

    // Manager event.
    let state = roundtrip(&mut stream, &mut reader, &json!({"action": "getState"}));
    assert_eq!(state["error"], Value::Null);
    assert_eq!(state["filters"][0]["id"], 5);

    // Filter event, routed by filterId.
    let resp = roundtrip(
        &mut stream,
        &mut reader,
        &json!({"action": "muteChannel", "filterId": 5, "params": {"id": 1}}),
    );
    assert_eq!(resp["error"], Value::Null);

    // Filter event with bad params reports the failure.
    let resp = roundtrip(
        &mut stream,
        &mut reader,
        &json!({"action": "muteChannel", "filterId": 5, "params": {"id": 42}}),
    );
    assert_eq!(resp["error"], "unknown channel id 42");

    // Unknown actions answer the canonical error.
    let resp = roundtrip(&mut stream, &mut reader, &json!({"action": "flyToTheMoon"}));
    assert_eq!(resp["error"], "unknown action");

    // Unrecognized filter ids fall through to the manager's map.
    let resp = roundtrip(
        &mut stream,
        &mut reader,
        &json!({"action": "getState", "filterId": 999}),
    );
    assert_eq!(resp["error"], Value::Null);

    // Shutdown ends the accept loop.
    let resp = roundtrip(&mut stream, &mut reader, &json!({"action": "stop"}));
    assert_eq!(resp["error"], Value::Null);
    handle.join().expect("controller thread exits");
}

#[test]
fn control_builds_a_pipeline_dynamically() {
    let (port, handle, manager) = start_controller();

    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));

    for msg in [
        json!({"action": "addFilter", "params": {"id": 20, "kind": "identity"}}),
        json!({"action": "addFilter", "params": {"id": 21, "kind": "identity"}}),
        json!({"action": "addWorker", "params": {"id": 9, "filterId": 20}}),
        json!({"action": "addPath", "params": {"id": 1, "filters": [20, 21]}}),
    ] {
        let resp = roundtrip(&mut stream, &mut reader, &msg);
        assert_eq!(resp["error"], Value::Null, "failed on {msg}: {resp}");
    }

    // Unknown kinds are reported, not fatal.
    let resp = roundtrip(
        &mut stream,
        &mut reader,
        &json!({"action": "addFilter", "params": {"id": 22, "kind": "teleporter"}}),
    );
    assert_eq!(resp["error"], "Configuration error: unknown filter kind 'teleporter'");

    // Everything the path references is up and running.
    {
        let manager = manager.lock().expect("manager");
        let path_workers: Vec<_> = manager.get_path(1).expect("path").workers().to_vec();
        assert!(path_workers.contains(&9));
        for id in path_workers {
            assert!(manager.worker(id).expect("worker").is_running());
        }
    }

    let resp = roundtrip(&mut stream, &mut reader, &json!({"action": "stop"}));
    assert_eq!(resp["error"], Value::Null);
    handle.join().expect("controller thread exits");
}

#[test]
fn malformed_json_closes_the_connection_only() {
    let (port, handle, manager) = start_controller();

    {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        stream.write_all(b"this is not json\n").expect("send garbage");
        let mut response = String::new();
        // The peer closes without answering.
        let read = reader.read_line(&mut response).expect("read");
        assert_eq!(read, 0, "connection must be closed, got {response:?}");
    }

    // The listener is still accepting.
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("reconnect");
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let resp = roundtrip(&mut stream, &mut reader, &json!({"action": "getState"}));
    assert_eq!(resp["error"], Value::Null);

    let resp = roundtrip(&mut stream, &mut reader, &json!({"action": "stop"}));
    assert_eq!(resp["error"], Value::Null);
    handle.join().expect("controller thread exits");
    assert!(manager.lock().expect("manager").shutdown_requested());
}
