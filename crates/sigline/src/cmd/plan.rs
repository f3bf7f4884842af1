use serde::Serialize;
use sigline::frame::{chunk, packet_capacity, PACKET_END, TAG_SIZE};
use sigline::link::LINK_HEADER_SIZE;

use crate::cmd::PlanArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{preview, print_json, table, OutputFormat};

#[derive(Serialize)]
struct PacketInfo {
    index: usize,
    kind: &'static str,
    wire_len: usize,
    content: String,
}

#[derive(Serialize)]
struct PlanOutput {
    unit_size: usize,
    capacity: usize,
    message_len: usize,
    total_packets: usize,
    packets: Vec<PacketInfo>,
}

pub fn run(args: PlanArgs, format: OutputFormat) -> CliResult<i32> {
    let message = match (args.data, args.file) {
        (Some(data), None) => data.into_bytes(),
        (None, Some(path)) => std::fs::read(&path)
            .map_err(|err| io_error(&format!("read {}", path.display()), err))?,
        _ => return Err(CliError::new(USAGE, "one of --data or --file is required")),
    };

    let capacity =
        packet_capacity(args.unit_size).map_err(|err| frame_error("plan", err))?;
    let packets = chunk(&message, args.unit_size).map_err(|err| frame_error("plan", err))?;

    let out = PlanOutput {
        unit_size: args.unit_size,
        capacity,
        message_len: message.len(),
        total_packets: packets.len(),
        packets: packets
            .iter()
            .enumerate()
            .map(|(index, packet)| PacketInfo {
                index,
                kind: if packet[0] == PACKET_END { "end" } else { "data" },
                wire_len: packet.len() + LINK_HEADER_SIZE,
                content: preview(&packet[TAG_SIZE..], 24),
            })
            .collect(),
    };

    print_plan(&out, format);
    Ok(SUCCESS)
}

fn print_plan(out: &PlanOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut packets = table(["#", "KIND", "WIRE BYTES", "CONTENT"]);
            for packet in &out.packets {
                packets.add_row(vec![
                    packet.index.to_string(),
                    packet.kind.to_string(),
                    packet.wire_len.to_string(),
                    packet.content.clone(),
                ]);
            }
            println!(
                "{} bytes in {} packets (unit {}, {} content bytes per packet)",
                out.message_len, out.total_packets, out.unit_size, out.capacity
            );
            println!("{packets}");
        }
        OutputFormat::Pretty => {
            println!("Packet Plan:");
            println!("  Unit size:        {}", out.unit_size);
            println!("  Content/packet:   {}", out.capacity);
            println!("  Message bytes:    {}", out.message_len);
            println!("  Packets:          {}", out.total_packets);
        }
    }
}
