use crate::error::{Result, SchemeError};
use crate::lexer::{Token, TokenBuffer};
use crate::value::Value;

// Read one datum from the buffer. An exhausted source before any token
// yields the eof object; exhaustion inside a datum is an error.
pub fn read(buffer: &mut TokenBuffer) -> Result<Value> {
    let token = match buffer.pop() {
        Some(token) => token,
        None => return Ok(Value::Eof),
    };
    read_datum(token, buffer)
}

fn read_datum(token: Token, buffer: &mut TokenBuffer) -> Result<Value> {
    match token {
        Token::Integer(n) => Ok(Value::Integer(n)),
        Token::Float(x) => Ok(Value::Float(x)),
        Token::Bool(b) => Ok(Value::Bool(b)),
        Token::Symbol(name) => Ok(Value::symbol(&name)),
        Token::Quote => {
            let quoted = match buffer.pop() {
                Some(token) => read_datum(token, buffer)?,
                None => return Err(SchemeError::UnexpectedEof),
            };
            Ok(Value::list(vec![Value::symbol("quote"), quoted]))
        }
        Token::LParen => read_tail(buffer),
        Token::RParen => Err(SchemeError::message("unexpected token: ')'")),
        Token::Dot => Err(SchemeError::message("unexpected token: '.'")),
    }
}

// Remainder of a list from just inside the parentheses: ")" closes the
// list, a single "." before the final item makes a dotted pair.
fn read_tail(buffer: &mut TokenBuffer) -> Result<Value> {
    match buffer.current() {
        None => Err(SchemeError::UnexpectedEof),
        Some(Token::RParen) => {
            buffer.pop();
            Ok(Value::Nil)
        }
        Some(Token::Dot) => {
            buffer.pop();
            let rest = read_tail(buffer)?;
            // exactly one item may follow the dot
            match &rest {
                Value::Pair(p) if p.borrow().cdr.is_nil() => Ok(p.borrow().car.clone()),
                _ => Err(SchemeError::MalformedPair),
            }
        }
        Some(_) => {
            let head = read(buffer)?;
            let tail = read_tail(buffer)?;
            Ok(Value::cons(head, tail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_one(src: &str) -> Result<Value> {
        let mut buffer = TokenBuffer::from_string(src);
        read(&mut buffer)
    }

    #[test]
    fn test_atoms() {
        assert_eq!(read_one("42").unwrap(), Value::Integer(42));
        assert_eq!(read_one("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(read_one("#t").unwrap(), Value::Bool(true));
        assert_eq!(read_one("foo").unwrap(), Value::symbol("foo"));
    }

    #[test]
    fn test_lists() {
        assert_eq!(read_one("()").unwrap(), Value::Nil);
        assert_eq!(
            read_one("(1 2 3)").unwrap(),
            Value::list(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(
            read_one("(a (b c))").unwrap(),
            Value::list(vec![
                Value::symbol("a"),
                Value::list(vec![Value::symbol("b"), Value::symbol("c")]),
            ])
        );
    }

    #[test]
    fn test_dotted_pairs() {
        assert_eq!(
            read_one("(1 . 2)").unwrap(),
            Value::cons(Value::Integer(1), Value::Integer(2))
        );
        assert_eq!(
            read_one("(1 2 . 3)").unwrap(),
            Value::cons(
                Value::Integer(1),
                Value::cons(Value::Integer(2), Value::Integer(3))
            )
        );
    }

    #[test]
    fn test_malformed_pairs() {
        assert_eq!(
            read_one("(1 . 2 3)").unwrap_err().to_string(),
            "malformed pair"
        );
        assert_eq!(read_one("(1 .)").unwrap_err().to_string(), "malformed pair");
    }

    #[test]
    fn test_quote_sugar() {
        assert_eq!(
            read_one("'x").unwrap(),
            Value::list(vec![Value::symbol("quote"), Value::symbol("x")])
        );
        assert_eq!(
            read_one("'(1 2)").unwrap(),
            Value::list(vec![
                Value::symbol("quote"),
                Value::list(vec![Value::Integer(1), Value::Integer(2)]),
            ])
        );
    }

    #[test]
    fn test_eof_object_at_end_of_stream() {
        assert_eq!(read_one("").unwrap(), Value::Eof);
        assert_eq!(read_one("; just a comment").unwrap(), Value::Eof);
    }

    #[test]
    fn test_eof_inside_datum_is_an_error() {
        assert_eq!(read_one("(1 2").unwrap_err().to_string(), "unexpected EOF");
    }

    #[test]
    fn test_multiple_datums_in_sequence() {
        let mut buffer = TokenBuffer::from_string("1 (2) three");
        assert_eq!(read(&mut buffer).unwrap(), Value::Integer(1));
        assert_eq!(
            read(&mut buffer).unwrap(),
            Value::list(vec![Value::Integer(2)])
        );
        assert_eq!(read(&mut buffer).unwrap(), Value::symbol("three"));
        assert_eq!(read(&mut buffer).unwrap(), Value::Eof);
    }

    #[test]
    fn test_datum_spanning_lines() {
        assert_eq!(
            read_one("(1\n 2\n 3)").unwrap(),
            Value::list(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }
}
