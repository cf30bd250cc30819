use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("fdxfer {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: fdxfer");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("FDXFER_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("descriptor_width: {}", fdxfer_codec::DESCRIPTOR_WIRE_WIDTH);
    println!(
        "max_descriptors_per_message: {}",
        fdxfer_codec::MAX_DESCRIPTORS_PER_MESSAGE
    );
    println!("features: cli={}", cfg!(feature = "cli"));

    Ok(SUCCESS)
}
