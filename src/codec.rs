use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::CRLF;

/// Serializes a command as a RESP array of bulk strings, the only request form servers accept
/// from clients.
///
/// `encode("SET", &["foo", "bar"])` produces `*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`.
pub fn encode<C, A>(command: C, args: &[A]) -> Bytes
where
    C: AsRef<[u8]>,
    A: AsRef<[u8]>,
{
    let mut dst = BytesMut::with_capacity(encoded_len(command.as_ref(), args));
    encode_into(&mut dst, command, args);
    dst.freeze()
}

/// Same as [`encode`], appending to an existing buffer.
pub fn encode_into<C, A>(dst: &mut BytesMut, command: C, args: &[A])
where
    C: AsRef<[u8]>,
    A: AsRef<[u8]>,
{
    dst.reserve(encoded_len(command.as_ref(), args));

    dst.put_u8(b'*');
    dst.put_slice((args.len() + 1).to_string().as_bytes());
    dst.put_slice(CRLF);

    put_bulk(dst, command.as_ref());
    for arg in args {
        put_bulk(dst, arg.as_ref());
    }
}

fn put_bulk(dst: &mut BytesMut, data: &[u8]) {
    dst.put_u8(b'$');
    dst.put_slice(data.len().to_string().as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}

fn encoded_len<A: AsRef<[u8]>>(command: &[u8], args: &[A]) -> usize {
    let bulk_len = |len: usize| 1 + digits(len) + CRLF.len() + len + CRLF.len();

    1 + digits(args.len() + 1)
        + CRLF.len()
        + bulk_len(command.len())
        + args.iter().map(|arg| bulk_len(arg.as_ref().len())).sum::<usize>()
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}
