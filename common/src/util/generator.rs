use rand::Rng;
use std::fs::File;
use std::io::Write;

const ROW_HEIGHT: f64 = 50.0;
const SLICE_STEP: f64 = 5.0;
const REG_WIDTH: f64 = 60.0;

fn write_library(file: &mut File) -> std::io::Result<()> {
    writeln!(file, "[[library]]")?;
    writeln!(file, "name = \"buf_x2\"")?;
    writeln!(file, "width = 20.0")?;
    writeln!(file, "height = {:.1}", ROW_HEIGHT)?;
    writeln!(file, "pins = [")?;
    writeln!(file, "  {{ name = \"i\", direction = \"in\", rect = [4.0, 10.0, 6.0, 40.0] }},")?;
    writeln!(file, "  {{ name = \"q\", direction = \"out\", rect = [14.0, 10.0, 16.0, 40.0] }},")?;
    writeln!(file, "  {{ name = \"vdd\", direction = \"in\", kind = \"power\", global = true }},")?;
    writeln!(file, "  {{ name = \"vss\", direction = \"in\", kind = \"ground\", global = true }},")?;
    writeln!(file, "]")?;
    writeln!(file)?;

    writeln!(file, "[[library]]")?;
    writeln!(file, "name = \"rowend_x0\"")?;
    writeln!(file, "width = 5.0")?;
    writeln!(file, "height = {:.1}", ROW_HEIGHT)?;
    writeln!(file, "pins = [")?;
    writeln!(file, "  {{ name = \"vdd\", direction = \"in\", kind = \"power\", global = true }},")?;
    writeln!(file, "  {{ name = \"vss\", direction = \"in\", kind = \"ground\", global = true }},")?;
    writeln!(file, "]")?;
    writeln!(file)?;

    writeln!(file, "[[library]]")?;
    writeln!(file, "name = \"sff1_x4\"")?;
    writeln!(file, "width = {:.1}", REG_WIDTH)?;
    writeln!(file, "height = {:.1}", ROW_HEIGHT)?;
    writeln!(file, "pins = [")?;
    writeln!(file, "  {{ name = \"ck\", direction = \"in\", kind = \"clock\", rect = [5.0, 20.0, 7.0, 30.0] }},")?;
    writeln!(file, "  {{ name = \"i\", direction = \"in\", rect = [20.0, 20.0, 22.0, 30.0] }},")?;
    writeln!(file, "  {{ name = \"q\", direction = \"out\", rect = [50.0, 20.0, 52.0, 30.0] }},")?;
    writeln!(file, "  {{ name = \"vdd\", direction = \"in\", kind = \"power\", global = true }},")?;
    writeln!(file, "  {{ name = \"vss\", direction = \"in\", kind = \"ground\", global = true }},")?;
    writeln!(file, "]")?;
    writeln!(file)
}

fn random_slot<R: Rng>(rng: &mut R, width: f64, height: f64) -> (f64, f64) {
    let columns = ((width - REG_WIDTH) / SLICE_STEP).max(1.0) as u32;
    let rows = ((height - ROW_HEIGHT) / ROW_HEIGHT).max(1.0) as u32;
    let x = rng.gen_range(0..columns) as f64 * SLICE_STEP;
    let y = rng.gen_range(0..rows) as f64 * ROW_HEIGHT;
    (x, y)
}

fn write_registers<R: Rng>(
    file: &mut File,
    rng: &mut R,
    prefix: &str,
    count: usize,
    width: f64,
    height: f64,
) -> std::io::Result<()> {
    for i in 0..count {
        let (x, y) = random_slot(rng, width, height);
        // Odd rows are mirrored about the row top edge.
        let (y, orientation) = if ((y / ROW_HEIGHT) as u32) % 2 == 1 {
            (y + ROW_HEIGHT, "FS")
        } else {
            (y, "N")
        };
        writeln!(
            file,
            "  {{ name = \"{}{}\", master = \"sff1_x4\", position = [{:.1}, {:.1}], orientation = \"{}\", connections = {{ ck = \"ck\" }} }},",
            prefix,
            i,
            x,
            y,
            orientation
        )?;
    }
    Ok(())
}

/// Writes a square design of `side` λ: a grid of `num_blocks` hierarchical
/// blocks, each with `regs_per_block` registers, plus `flat_regs` registers
/// placed directly in the top cell. All registers share the top clock `ck`.
pub fn generate_register_design(
    filename: &str,
    side: f64,
    num_blocks: usize,
    regs_per_block: usize,
    flat_regs: usize,
) -> std::io::Result<()> {
    let mut file = File::create(filename)?;
    let mut rng = rand::thread_rng();

    let side = (side / ROW_HEIGHT).floor().max(4.0) * ROW_HEIGHT;
    let per_row = (num_blocks as f64).sqrt().ceil().max(1.0) as usize;
    let block_side = ((side / per_row as f64 / 2.0) / ROW_HEIGHT).floor().max(2.0) * ROW_HEIGHT;
    let pitch = side / per_row as f64;

    log::info!(
        "Generating Benchmark: {} blocks x {} registers, {} flat registers, Die: {}x{} lambda",
        num_blocks,
        regs_per_block,
        flat_regs,
        side,
        side
    );

    write_library(&mut file)?;

    for b in 0..num_blocks {
        writeln!(file, "[[cells]]")?;
        writeln!(file, "name = \"block_{}\"", b)?;
        writeln!(file, "abutment_box = [0.0, 0.0, {:.1}, {:.1}]", block_side, block_side)?;
        writeln!(
            file,
            "nets = [{{ name = \"ck\", kind = \"clock\", external = true, direction = \"in\" }}]"
        )?;
        writeln!(file, "instances = [")?;
        write_registers(&mut file, &mut rng, "reg_", regs_per_block, block_side, block_side)?;
        writeln!(file, "]")?;
        writeln!(file)?;
    }

    writeln!(file, "[[cells]]")?;
    writeln!(file, "name = \"top\"")?;
    writeln!(file, "abutment_box = [0.0, 0.0, {:.1}, {:.1}]", side, side)?;
    writeln!(
        file,
        "nets = [{{ name = \"ck\", kind = \"clock\", external = true, direction = \"in\" }}]"
    )?;
    writeln!(file, "instances = [")?;
    for b in 0..num_blocks {
        let x = (b % per_row) as f64 * pitch + (pitch - block_side) / 2.0;
        let y = (b / per_row) as f64 * pitch + (pitch - block_side) / 2.0;
        let x = (x / SLICE_STEP).floor() * SLICE_STEP;
        let y = (y / ROW_HEIGHT).floor() * ROW_HEIGHT;
        writeln!(
            file,
            "  {{ name = \"blk_{}\", master = \"block_{}\", position = [{:.1}, {:.1}], connections = {{ ck = \"ck\" }} }},",
            b, b, x, y
        )?;
    }
    write_registers(&mut file, &mut rng, "r_", flat_regs, side, side)?;
    writeln!(file, "]")?;
    Ok(())
}
