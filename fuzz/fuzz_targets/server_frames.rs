#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use scene::{Animator, MemoryScene, ObjectId, SceneObject, Vec3};
use server::{
    decode_message, ActionConfig, ConnectionId, NetEvent, Registry, Server, ServerConfig,
    SocketHandle,
};

// Input is a sequence of frames, each prefixed by a one-byte length.
fuzz_target!(|data: &[u8]| {
    let config = ServerConfig::for_testing();
    let scene = MemoryScene::from_objects([
        SceneObject::new(ObjectId::new(1), "cube").with_property("location", Vec3::ZERO)
    ])
    .unwrap();
    let registry = Registry::from_config(&ActionConfig::standard()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut server = Server::new(&config, Arc::new(registry), scene, Animator::new(), rx);

    let conn = ConnectionId::new(1);
    let (socket, _outbox) = SocketHandle::channel(conn);
    server
        .handle_event(NetEvent::Connected {
            address: "127.0.0.1:1".parse().unwrap(),
            socket,
        })
        .unwrap();
    drop(tx);

    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (frame, tail) = tail.split_at(len);
        rest = tail;
        if let Ok(Some(message)) = decode_message(frame, &config.frame_limits) {
            server
                .handle_event(NetEvent::Message { conn, message })
                .unwrap();
        }
    }
    server.run_cycle().unwrap();
});
