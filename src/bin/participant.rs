use anonymous_communication_protocols::amdc;
use anonymous_communication_protocols::cli_utils::{parse_peer, ParticipantArgs, Protocol};
use anonymous_communication_protocols::mailbox::Mailbox;
use anonymous_communication_protocols::participant::{Participant, DEFAULT_MESSAGE_LENGTH};
use anonymous_communication_protocols::transport::tcp::TcpTransport;
use anonymous_communication_protocols::transport::{MessageSink, Transport};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ParticipantArgs::parse();
    protocol(args)
}

fn protocol(args: ParticipantArgs) -> Result<()> {
    let mailbox = Arc::new(match args.round_deadline {
        Some(secs) => Mailbox::with_deadline(Duration::from_secs(secs)),
        None => Mailbox::new(),
    });
    let sink: Arc<dyn MessageSink> = mailbox.clone();

    let transport = TcpTransport::bind(
        &args.host,
        args.port,
        args.id.clone(),
        args.max_connections,
        sink,
    )
    .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    println!(
        "{}: listening on {}:{}",
        transport.node_id(),
        args.host,
        args.port
    );

    for peer in &args.connect {
        let (host, port) = parse_peer(peer)?;
        transport
            .connect(&host, port)
            .with_context(|| format!("failed to connect to {}", peer))?;
    }

    transport
        .wait_for_peers(args.num_parties - 1, Duration::from_secs(60))
        .context("mesh did not complete")?;
    println!(
        "{}: connected to {} peers",
        transport.node_id(),
        transport.peer_count()
    );

    let node_id = transport.node_id().to_string();
    let mut participant = Participant::new(transport, mailbox);
    let mut rng = rand::thread_rng();

    participant.set_parity_input(args.input_bit != 0);
    participant.set_veto_input(args.input_bit != 0);
    participant.set_collision_detection_input(args.input_bit != 0);
    if !args.notify.is_empty() {
        participant.set_notification_input(Some(&args.notify))?;
    }
    if !args.message.is_empty() {
        participant.set_message_input(&args.message)?;
    }

    match args.protocol {
        Protocol::Parity => {
            let result = participant.execute_parity(&mut rng)?;
            println!("{}: parity result = {}", node_id, result as u8);
        }
        Protocol::Veto => {
            let result = participant.execute_veto(args.security, &mut rng)?;
            println!("{}: veto result = {}", node_id, result as u8);
        }
        Protocol::CollisionDetection => {
            let result = participant.execute_collision_detection(args.security, &mut rng)?;
            println!("{}: collision detection result = {:?}", node_id, result);
        }
        Protocol::Notification => {
            let result = participant.execute_notification(args.security, &mut rng)?;
            println!("{}: notification result = {}", node_id, result as u8);
        }
        Protocol::FixedMessage => {
            participant.set_message_sender(args.sender);
            participant.set_message_receiver(args.receiver);
            let bit_count = amdc::encoded_length(args.security, DEFAULT_MESSAGE_LENGTH);
            participant.execute_fixed_role_message_transmission(
                args.security,
                bit_count,
                &mut rng,
            )?;
            println!(
                "{}: veto result = {} - received message = {:?}",
                node_id,
                participant.veto_result() as u8,
                participant.received_message()
            );
        }
        Protocol::MessageTransmission => {
            let status = participant.execute_message_transmission(args.security, &mut rng)?;
            println!("{}: transmission status = {:?}", node_id, status);
            if participant.is_message_receiver() {
                println!(
                    "{}: received message = {:?}",
                    node_id,
                    participant.received_message()
                );
            }
        }
    }

    participant.transport().shutdown();
    Ok(())
}
