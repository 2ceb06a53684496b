use bincode::{deserialize, serialize};
use clap::Parser;
use rand::Rng;
use shared::{EntryCarInfo, Packet, PlayerGuid, Vector3};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Simulated racing host that drives the stats tracker over UDP
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address of the stats tracker
    #[clap(short, long, default_value = "127.0.0.1:9600")]
    server: SocketAddr,
    /// Number of simulated drivers
    #[clap(short, long, default_value = "3")]
    drivers: u64,
    /// How long the drivers stay connected
    #[clap(long, default_value = "20")]
    duration_secs: u64,
    /// Car model every driver uses
    #[clap(short, long, default_value = "ks_mazda_mx5_cup")]
    model: String,
}

async fn send(socket: &UdpSocket, server: SocketAddr, packet: &Packet) -> std::io::Result<()> {
    let data = serialize(packet).map_err(std::io::Error::other)?;
    socket.send_to(&data, server).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut rng = rand::thread_rng();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Host socket bound to {}", socket.local_addr()?);

    let drivers: Vec<PlayerGuid> = (0..args.drivers)
        .map(|i| 76_561_198_000_000_000 + i)
        .collect();

    let cars: Vec<EntryCarInfo> = drivers
        .iter()
        .map(|guid| EntryCarInfo {
            model: args.model.clone(),
            driver: Some(format!("Driver {}", guid % 1000)),
            ai_controlled: false,
        })
        .collect();
    send(&socket, args.server, &Packet::EntryList { cars }).await?;

    for &guid in &drivers {
        let connect = Packet::Connect {
            guid,
            name: Some(format!("Driver {}", guid % 1000)),
            model: args.model.clone(),
        };
        println!("Connecting driver {}", guid);
        send(&socket, args.server, &connect).await?;
        send(&socket, args.server, &Packet::Ready { guid }).await?;
    }

    // Report velocities four times per tracker tick
    let steps = args.duration_secs * 4;
    for _ in 0..steps {
        for &guid in &drivers {
            let velocity = Vector3::new(
                rng.gen_range(0.0..70.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..10.0),
            );
            send(&socket, args.server, &Packet::Velocity { guid, velocity }).await?;
        }
        sleep(Duration::from_millis(250)).await;
    }

    let mut buf = [0u8; 2048];
    for &guid in &drivers {
        send(&socket, args.server, &Packet::QueryStats { guid }).await?;

        match timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[..len]) {
                Ok(Packet::LiveStats {
                    guid,
                    name,
                    average_speed,
                    top_speed,
                }) => println!(
                    "  {} ({}): avg {} km/h, top {} km/h",
                    name, guid, average_speed, top_speed
                ),
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize stats: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving stats: {}", e),
            Err(_) => println!("No stats received for {}", guid),
        }
    }

    for &guid in &drivers {
        println!("Disconnecting driver {}", guid);
        send(&socket, args.server, &Packet::Disconnect { guid }).await?;
    }

    println!("Fake host finished");
    Ok(())
}
