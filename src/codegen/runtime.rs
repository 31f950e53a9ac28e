//! Fixed runtime support emitted verbatim into every module: WASI
//! `fd_write`-backed console output, a bump allocator over linear
//! memory, and the numeric/string print helpers every `print` call
//! lowers to.
//!
//! None of this text is copied from anywhere -- the original only ever
//! declares these helpers' signatures, never their bodies -- so it is
//! authored directly against the behavior each one is documented to
//! have.

use super::Ctx;
use crate::error::{CompileError, Result};

/// `print_format`'s dynamic path does not re-parse a `{N}` precision
/// suffix out of a runtime string; every `%r`/`%e` it handles uses this
/// fixed precision. Only the compile-time literal path (`codegen::format`)
/// honors an explicit precision.
const DYNAMIC_PRECISION: i32 = 6;

pub fn emit_runtime(ctx: &Ctx, out: &mut String) -> Result<()> {
    let nl = req(ctx, "\n")?;
    let dot = req(ctx, ".")?;
    let minus = req(ctx, "-")?;
    let plus = req(ctx, "+")?;
    let exp = req(ctx, "e")?;
    let zero = req(ctx, "0")?;
    let true_lit = req(ctx, "true")?;
    let false_lit = req(ctx, "false")?;

    out.push_str(
        "  (func $write_bytes (param $ptr i32) (param $len i32)
    i32.const 0
    local.get $ptr
    i32.store
    i32.const 4
    local.get $len
    i32.store
    i32.const 1
    i32.const 0
    i32.const 1
    i32.const 8
    call $fd_write
    drop
  )

  (func $write_byte (param $val i32)
    i32.const 64
    local.get $val
    i32.store8
    i32.const 64
    i32.const 1
    call $write_bytes
  )

  (func $alloc (param $size i64) (result i64)
    (local $rounded i64) (local $addr i64) (local $needed i64) (local $cur_bytes i64) (local $grow_pages i32)
    local.get $size
    i64.const 7
    i64.add
    i64.const -8
    i64.and
    local.set $rounded
    global.get $heap
    local.set $addr
    local.get $addr
    local.get $rounded
    i64.add
    local.set $needed
    memory.size
    i64.extend_i32_u
    i64.const 65536
    i64.mul
    local.set $cur_bytes
    local.get $needed
    local.get $cur_bytes
    i64.gt_s
    if
      local.get $needed
      local.get $cur_bytes
      i64.sub
      i64.const 65535
      i64.add
      i64.const 65536
      i64.div_s
      i32.wrap_i64
      local.set $grow_pages
      local.get $grow_pages
      memory.grow
      drop
    end
    local.get $needed
    global.set $heap
    local.get $addr
  )

  (func $print_string_raw (param $ptr i64)
    (local $len i32)
    local.get $ptr
    i32.wrap_i64
    i64.load
    i32.wrap_i64
    local.set $len
    local.get $ptr
    i32.wrap_i64
    i32.const 8
    i32.add
    local.get $len
    call $write_bytes
  )

",
    );

    out.push_str(&format!(
        "  (func $print_string (param $ptr i64)
    local.get $ptr
    call $print_string_raw
    i32.const {nl8}
    i32.const 1
    call $write_bytes
  )

  (func $print_bool_raw (param $val i64)
    local.get $val
    i32.wrap_i64
    if
      i32.const {true8}
      i32.const 4
      call $write_bytes
    else
      i32.const {false8}
      i32.const 5
      call $write_bytes
    end
  )

  (func $print_bool (param $val i64)
    local.get $val
    call $print_bool_raw
    i32.const {nl8}
    i32.const 1
    call $write_bytes
  )

",
        nl8 = nl + 8,
        true8 = true_lit + 8,
        false8 = false_lit + 8,
    ));

    out.push_str(
        "  (func $print_i64_raw (param $val i64)
    (local $n i64) (local $neg i32) (local $pos i32)
    local.get $val
    local.set $n
    i32.const 0
    local.set $neg
    local.get $n
    i64.const 0
    i64.lt_s
    if
      i32.const 1
      local.set $neg
      i64.const 0
      local.get $n
      i64.sub
      local.set $n
    end
    i32.const 128
    local.set $pos
    local.get $n
    i64.eqz
    if
      local.get $pos
      i32.const 1
      i32.sub
      local.tee $pos
      i32.const 48
      i32.store8
    end
    (block $done
      (loop $digits
        local.get $n
        i64.eqz
        br_if $done
        local.get $pos
        i32.const 1
        i32.sub
        local.tee $pos
        local.get $n
        i64.const 10
        i64.rem_s
        i32.wrap_i64
        i32.const 48
        i32.add
        i32.store8
        local.get $n
        i64.const 10
        i64.div_s
        local.set $n
        br $digits
      )
    )
    local.get $neg
    if
      local.get $pos
      i32.const 1
      i32.sub
      local.tee $pos
      i32.const 45
      i32.store8
    end
    local.get $pos
    i32.const 128
    local.get $pos
    i32.sub
    call $write_bytes
  )

",
    );

    out.push_str(&format!(
        "  (func $print_i64 (param $val i64)
    local.get $val
    call $print_i64_raw
    i32.const {nl8}
    i32.const 1
    call $write_bytes
  )

",
        nl8 = nl + 8,
    ));

    out.push_str(
        "  (func $pow10_i64 (param $n i64) (result i64)
    (local $result i64) (local $i i64)
    i64.const 1
    local.set $result
    i64.const 0
    local.set $i
    (block $done
      (loop $again
        local.get $i
        local.get $n
        i64.ge_s
        br_if $done
        local.get $result
        i64.const 10
        i64.mul
        local.set $result
        local.get $i
        i64.const 1
        i64.add
        local.set $i
        br $again
      )
    )
    local.get $result
  )

  (func $print_fixed (param $frac f64) (param $prec i32)
    (local $scaled i64) (local $pow i64) (local $pos i32) (local $i i32)
    local.get $prec
    i64.extend_i32_s
    call $pow10_i64
    local.set $pow
    local.get $frac
    local.get $pow
    f64.convert_i64_s
    f64.mul
    f64.const 0.5
    f64.add
    i64.trunc_f64_s
    local.set $scaled
    i32.const 128
    local.set $pos
    i32.const 0
    local.set $i
    (block $done
      (loop $digits
        local.get $i
        local.get $prec
        i32.ge_s
        br_if $done
        local.get $pos
        i32.const 1
        i32.sub
        local.tee $pos
        local.get $scaled
        i64.const 10
        i64.rem_s
        i32.wrap_i64
        i32.const 48
        i32.add
        i32.store8
        local.get $scaled
        i64.const 10
        i64.div_s
        local.set $scaled
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $digits
      )
    )
    local.get $pos
    i32.const 128
    local.get $pos
    i32.sub
    call $write_bytes
  )

",
    );

    out.push_str(&format!(
        "  (func $print_f64_prec (param $val f64) (param $prec i32)
    (local $neg i32) (local $abs f64) (local $int_part i64) (local $frac f64)
    local.get $val
    f64.const 0
    f64.lt
    local.set $neg
    local.get $neg
    if
      i32.const {minus8}
      i32.const 1
      call $write_bytes
      f64.const -1
      local.get $val
      f64.mul
      local.set $abs
    else
      local.get $val
      local.set $abs
    end
    local.get $abs
    i64.trunc_f64_s
    local.set $int_part
    local.get $int_part
    call $print_i64_raw
    i32.const {dot8}
    i32.const 1
    call $write_bytes
    local.get $abs
    local.get $int_part
    f64.convert_i64_s
    f64.sub
    local.set $frac
    local.get $frac
    local.get $prec
    call $print_fixed
  )

  (func $print_f64_raw (param $val f64)
    local.get $val
    i32.const {default_prec}
    call $print_f64_prec
  )

  (func $print_f64 (param $val f64)
    local.get $val
    call $print_f64_raw
    i32.const {nl8}
    i32.const 1
    call $write_bytes
  )

",
        minus8 = minus + 8,
        dot8 = dot + 8,
        default_prec = DYNAMIC_PRECISION,
        nl8 = nl + 8,
    ));

    out.push_str(&format!(
        "  (func $print_f64_sci (param $val f64) (param $prec i32)
    (local $neg i32) (local $abs f64) (local $exp i64) (local $exp_neg i32) (local $exp_abs i64)
    local.get $val
    f64.const 0
    f64.lt
    local.set $neg
    local.get $neg
    if
      i32.const {minus8}
      i32.const 1
      call $write_bytes
      f64.const -1
      local.get $val
      f64.mul
      local.set $abs
    else
      local.get $val
      local.set $abs
    end
    i64.const 0
    local.set $exp
    local.get $abs
    f64.const 0
    f64.eq
    if
    else
      (block $norm_done
        (loop $shrink
          local.get $abs
          f64.const 10
          f64.lt
          br_if $norm_done
          local.get $abs
          f64.const 10
          f64.div
          local.set $abs
          local.get $exp
          i64.const 1
          i64.add
          local.set $exp
          br $shrink
        )
      )
      (block $grow_done
        (loop $grow
          local.get $abs
          f64.const 1
          f64.lt
          i32.eqz
          br_if $grow_done
          local.get $abs
          f64.const 10
          f64.mul
          local.set $abs
          local.get $exp
          i64.const 1
          i64.sub
          local.set $exp
          br $grow
        )
      )
    end
    local.get $abs
    local.get $prec
    call $print_f64_prec
    i32.const {exp8}
    i32.const 1
    call $write_bytes
    local.get $exp
    i64.const 0
    i64.lt_s
    local.set $exp_neg
    local.get $exp_neg
    if
      i32.const {minus8}
      i32.const 1
      call $write_bytes
      i64.const 0
      local.get $exp
      i64.sub
      local.set $exp_abs
    else
      i32.const {plus8}
      i32.const 1
      call $write_bytes
      local.get $exp
      local.set $exp_abs
    end
    local.get $exp_abs
    i64.const 10
    i64.lt_s
    if
      i32.const {zero8}
      i32.const 1
      call $write_bytes
    end
    local.get $exp_abs
    call $print_i64_raw
  )

",
        minus8 = minus + 8,
        exp8 = exp + 8,
        plus8 = plus + 8,
        zero8 = zero + 8,
    ));

    out.push_str(
        "  (func $print_format (param $fmt i64) (param $args i64) (param $count i32)
    (local $len i32) (local $base i32) (local $i i32) (local $lit_start i32) (local $argi i32)
    (local $c i32) (local $next i32) (local $tag i32) (local $slot i32)
    local.get $fmt
    i32.wrap_i64
    i64.load
    i32.wrap_i64
    local.set $len
    local.get $fmt
    i32.wrap_i64
    i32.const 8
    i32.add
    local.set $base
    i32.const 0
    local.set $i
    local.get $base
    local.set $lit_start
    i32.const 0
    local.set $argi
    (block $done
      (loop $scan
        local.get $i
        local.get $len
        i32.ge_s
        br_if $done
        local.get $base
        local.get $i
        i32.add
        i32.load8_u
        local.set $c
        local.get $c
        i32.const 37
        i32.eq
        if
          local.get $i
          i32.const 1
          i32.add
          local.get $len
          i32.ge_s
          if
            local.get $i
            i32.const 1
            i32.add
            local.set $i
            br $scan
          end
          local.get $base
          local.get $i
          i32.const 1
          i32.add
          i32.add
          i32.load8_u
          local.set $next
          local.get $next
          i32.const 37
          i32.eq
          if
            local.get $i
            i32.const 2
            i32.add
            local.set $i
            br $scan
          end
          local.get $lit_start
          local.get $base
          local.get $i
          i32.add
          local.get $lit_start
          i32.sub
          call $write_bytes
          local.get $argi
          local.get $count
          i32.lt_s
          if
            local.get $args
            i32.wrap_i64
            local.get $argi
            i32.const 16
            i32.mul
            i32.add
            local.set $slot
            local.get $slot
            i32.load
            local.set $tag
            local.get $tag
            i32.const 1
            i32.eq
            if
              local.get $slot
              i32.const 8
              i32.add
              i64.load
              call $print_i64_raw
            else
              local.get $tag
              i32.const 2
              i32.eq
              if
                local.get $slot
                i32.const 8
                i32.add
                f64.load
                i32.const 6
                call $print_f64_prec
              else
                local.get $tag
                i32.const 3
                i32.eq
                if
                  local.get $slot
                  i32.const 8
                  i32.add
                  i64.load
                  call $print_bool_raw
                else
                  local.get $slot
                  i32.const 8
                  i32.add
                  i64.load
                  call $print_string_raw
                end
              end
            end
            local.get $argi
            i32.const 1
            i32.add
            local.set $argi
          end
          local.get $i
          i32.const 2
          i32.add
          local.set $i
          local.get $base
          local.get $i
          i32.add
          local.set $lit_start
          br $scan
        end
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $scan
      )
    )
    local.get $lit_start
    local.get $base
    local.get $i
    i32.add
    local.get $lit_start
    i32.sub
    call $write_bytes
  )

",
    );

    out.push_str(
        "  (func $cstrlen (param $ptr i32) (result i32)
    (local $i i32)
    i32.const 0
    local.set $i
    (block $done
      (loop $again
        local.get $ptr
        local.get $i
        i32.add
        i32.load8_u
        i32.eqz
        br_if $done
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $again
      )
    )
    local.get $i
  )

  (func $build_args (result i64)
    (local $argc i32) (local $buf_size i32) (local $argv_ptrs i32) (local $argv_buf i32)
    (local $count i64) (local $result i32) (local $i i32) (local $str_len i32) (local $str_ptr i32)
    (local $elem i32) (local $j i32)
    i32.const 0
    i32.const 4
    call $args_sizes_get
    drop
    i32.const 0
    i32.load
    local.set $argc
    i32.const 4
    i32.load
    local.set $buf_size
    local.get $argc
    i32.const 4
    i32.mul
    i64.extend_i32_u
    call $alloc
    i32.wrap_i64
    local.set $argv_ptrs
    local.get $buf_size
    i64.extend_i32_u
    call $alloc
    i32.wrap_i64
    local.set $argv_buf
    local.get $argv_ptrs
    local.get $argv_buf
    call $args_get
    drop
    local.get $argc
    i32.const 1
    i32.sub
    i64.extend_i32_s
    local.set $count
    local.get $count
    i64.const 8
    i64.add
    call $alloc
    i32.wrap_i64
    local.set $result
    local.get $result
    local.get $count
    i64.store
    i32.const 1
    local.set $i
    (block $done
      (loop $each
        local.get $i
        local.get $argc
        i32.ge_s
        br_if $done
        local.get $argv_ptrs
        local.get $i
        i32.const 4
        i32.mul
        i32.add
        i32.load
        local.set $str_ptr
        local.get $str_ptr
        call $cstrlen
        local.set $str_len
        local.get $str_len
        i64.extend_i32_u
        i64.const 8
        i64.add
        call $alloc
        i32.wrap_i64
        local.set $elem
        local.get $elem
        local.get $str_len
        i64.extend_i32_u
        i64.store
        i32.const 0
        local.set $j
        (block $copy_done
          (loop $copy
            local.get $j
            local.get $str_len
            i32.ge_s
            br_if $copy_done
            local.get $elem
            i32.const 8
            i32.add
            local.get $j
            i32.add
            local.get $str_ptr
            local.get $j
            i32.add
            i32.load8_u
            i32.store8
            local.get $j
            i32.const 1
            i32.add
            local.set $j
            br $copy
          )
        )
        local.get $result
        i32.const 8
        i32.add
        local.get $i
        i32.const 1
        i32.sub
        i32.const 8
        i32.mul
        i32.add
        local.get $elem
        i64.extend_i32_u
        i64.store
        local.get $i
        i32.const 1
        i32.add
        local.set $i
        br $each
      )
    )
    local.get $result
    i64.extend_i32_u
  )

",
    );

    Ok(())
}

fn req(ctx: &Ctx, literal: &str) -> Result<i64> {
    ctx.strings
        .offset_of(literal)
        .ok_or_else(|| CompileError::new(format!("Internal error: builtin literal {literal:?} not interned")))
}
